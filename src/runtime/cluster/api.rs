// ABOUTME: The cluster operations the runtime and image builder depend on.
// ABOUTME: Implemented by whichever cluster client the application wires in.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

use super::resources::{
    ConfigMapSpec, ExposureSpec, JobStatus, Labels, PodStatus, WorkloadKind, WorkloadSpec,
};
use crate::logs::LineStream;
use crate::runtime::traits::{ExecOutput, ExecRequest};

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no pod appeared for {selector} within {timeout:?}")]
    NoPods { selector: String, timeout: Duration },

    #[error("{kind} {name} still present after {timeout:?}")]
    DeleteTimeout {
        kind: &'static str,
        name: String,
        timeout: Duration,
    },

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// One change notification from a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
    /// The server reported an error; the watch ends after this.
    Error(String),
}

pub type WatchStream<T> = BoxStream<'static, WatchEvent<T>>;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Whether the current identity may perform `verb` on `resource`.
    async fn can_i(
        &self,
        verb: &str,
        resource: &str,
        namespace: Option<&str>,
    ) -> Result<bool, ClusterError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError>;

    async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError>;

    async fn apply_workload(&self, workload: &WorkloadSpec) -> Result<(), ClusterError>;

    async fn workload_exists(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<bool, ClusterError>;

    async fn scale_workload(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError>;

    /// Deletes the workload and, by propagation, its pods.
    async fn delete_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<(), ClusterError>;

    async fn create_exposure(&self, exposure: &ExposureSpec) -> Result<(), ClusterError>;

    async fn exposure_exists(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;

    async fn delete_exposure(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn create_config_map(&self, config_map: &ConfigMapSpec) -> Result<(), ClusterError>;

    /// Names of config maps matching every label in `selector`.
    async fn list_config_maps(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<String>, ClusterError>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<PodStatus>, ClusterError>;

    /// `None` when the pod no longer exists.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodStatus>, ClusterError>;

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace: Duration,
    ) -> Result<(), ClusterError>;

    async fn watch_pods(
        &self,
        namespace: &str,
        selector: &Labels,
    ) -> Result<WatchStream<PodStatus>, ClusterError>;

    async fn watch_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WatchStream<JobStatus>, ClusterError>;

    /// Follow a container's output from the beginning.
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<LineStream, ClusterError>;

    /// Run a command in a container. `stderr` is always `Some`. A command
    /// that cannot be launched is `ClusterError::Exec`, not an exit code.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        request: &ExecRequest,
    ) -> Result<ExecOutput, ClusterError>;
}
