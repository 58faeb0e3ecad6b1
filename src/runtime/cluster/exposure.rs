// ABOUTME: Decides how a workload's ports are exposed.
// ABOUTME: Internal-only inside the cluster, node ports from outside it.

use std::ops::RangeInclusive;

use super::resources::{ExposedPort, ExposureSpec, ExposureType, Labels};
use crate::config::ContainerSpec;

/// The default node port range of the cluster's API server.
pub const NODE_PORT_RANGE: RangeInclusive<u16> = 30000..=32767;

pub fn exposure_type(in_cluster: bool) -> ExposureType {
    if in_cluster {
        ExposureType::ClusterIp
    } else {
        ExposureType::NodePort
    }
}

/// The exposure for `spec`, or `None` when it exposes no ports.
///
/// Mapped ports become the service port and, for node ports, the node port.
/// Node ports outside [`NODE_PORT_RANGE`] are passed through with a warning;
/// the API server has the final say.
pub fn exposure_for(spec: &ContainerSpec, in_cluster: bool, selector: &Labels) -> Option<ExposureSpec> {
    if spec.exposed_ports.is_empty() {
        return None;
    }
    let exposure_type = exposure_type(in_cluster);

    let ports = spec
        .exposed_ports
        .iter()
        .map(|(name, &port)| {
            let mapped = spec.mapped_port(port);
            let node_port = match exposure_type {
                ExposureType::NodePort => mapped,
                ExposureType::ClusterIp => None,
            };
            if let Some(node_port) = node_port
                && !NODE_PORT_RANGE.contains(&node_port)
            {
                tracing::warn!(
                    container = %spec.name,
                    "node port {} for {} is outside {}-{}; the cluster may reject it",
                    node_port,
                    name,
                    NODE_PORT_RANGE.start(),
                    NODE_PORT_RANGE.end()
                );
            }
            ExposedPort {
                name: name.clone(),
                port: mapped.unwrap_or(port),
                target_port: port,
                node_port,
            }
        })
        .collect();

    Some(ExposureSpec {
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        exposure_type,
        selector: selector.clone(),
        labels: selector.clone(),
        ports,
    })
}

/// Cluster DNS name of an exposure.
pub fn service_dns(name: &str, namespace: &str) -> String {
    format!("{}.{}.svc.cluster.local", name, namespace)
}
