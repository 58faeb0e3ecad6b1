// ABOUTME: Detects whether this process runs inside the cluster.
// ABOUTME: The cluster runtime uses it to pick exposure type and reachable addresses.

use std::path::Path;

const SERVICE_HOST_VAR: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Override for tests and unusual setups: `true`/`false` skips detection.
pub const IN_CLUSTER_OVERRIDE_VAR: &str = "BERTH_IN_CLUSTER";

/// `true` when the process runs inside a cluster pod.
pub fn running_in_cluster() -> bool {
    if let Ok(value) = std::env::var(IN_CLUSTER_OVERRIDE_VAR) {
        return matches!(value.trim(), "1" | "true" | "yes");
    }
    std::env::var_os(SERVICE_HOST_VAR).is_some() && Path::new(SERVICE_ACCOUNT_TOKEN).exists()
}
