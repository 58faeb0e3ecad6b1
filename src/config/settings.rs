// ABOUTME: Tunable timeouts shared by the runtimes and the image builder.
// ABOUTME: Loaded from YAML with humantime durations, or defaulted.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How long the cluster runtime waits for a pod to appear after submitting a workload.
    #[serde(with = "humantime_serde")]
    pub pod_ready_timeout: Duration,

    /// How long deletes wait for a cluster resource to disappear.
    #[serde(with = "humantime_serde")]
    pub resource_delete_timeout: Duration,

    /// Grace period for a graceful stop before the engine kills the process.
    #[serde(with = "humantime_serde")]
    pub stop_grace_period: Duration,

    /// How long an image build waits for its builder pod.
    #[serde(with = "humantime_serde")]
    pub build_pod_timeout: Duration,

    /// Ceiling on a whole image build.
    #[serde(with = "humantime_serde")]
    pub build_timeout: Duration,

    /// Interval for existence polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pod_ready_timeout: Duration::from_secs(30),
            resource_delete_timeout: Duration::from_secs(30),
            stop_grace_period: Duration::from_secs(10),
            build_pod_timeout: Duration::from_secs(100),
            build_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}
