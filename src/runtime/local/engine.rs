// ABOUTME: The slice of the Docker-compatible engine API the local runtime needs.
// ABOUTME: BollardEngine implements it for real; tests substitute a fake.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::{Resources, VolumeMount};
use crate::logs::LineStream;
use crate::runtime::traits::ExecOutput;
use crate::types::{ContainerId, ImageRef};

/// Errors from engine calls.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("container {0} is still running; stop it or delete with force")]
    StillRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("image pull failed: {0}")]
    PullFailed(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("archive transfer failed: {0}")]
    Archive(String),

    #[error("cannot reach engine: {0}")]
    Connection(String),

    #[error("engine error: {0}")]
    Runtime(String),
}

impl EngineError {
    /// Whether the error means there was nothing left to act on.
    pub fn is_gone(&self) -> bool {
        matches!(self, EngineError::NotFound(_) | EngineError::NotRunning(_))
    }
}

/// A container port, optionally published on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPublish {
    pub container_port: u16,
    pub host_port: Option<u16>,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub name: String,
    pub image: Option<ImageRef>,
    pub env: HashMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Replaces the image entrypoint when set.
    pub entrypoint: Option<Vec<String>>,
    pub args: Vec<String>,
    pub ports: Vec<PortPublish>,
    pub volumes: Vec<VolumeMount>,
    pub resources: Resources,
    pub network: Option<String>,
}

/// What `inspect` reports about a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub id: String,
    pub running: bool,
    pub exit_code: Option<i64>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Hostname that reaches ports published by this engine.
    fn host(&self) -> String {
        "localhost".to_string()
    }

    async fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError>;

    async fn pull_image(&self, image: &ImageRef) -> Result<(), EngineError>;

    async fn create_container(&self, request: &CreateRequest) -> Result<ContainerId, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    async fn kill_container(&self, id: &str) -> Result<(), EngineError>;

    /// `id` may also be a container name.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus, EngineError>;

    /// Block until the container exits; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Run a command to completion. Output streams arrive merged in `stdout`.
    async fn exec(
        &self,
        id: &str,
        command: &[String],
        tty: bool,
        working_dir: Option<&str>,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, EngineError>;

    /// Extract a tar archive into `dir` inside the container.
    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>)
    -> Result<(), EngineError>;

    /// Tar archive of `path` inside the container, rooted at its base name.
    async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, EngineError>;

    /// Follow stdout and stderr from the beginning.
    fn follow_logs(&self, id: &str) -> LineStream;
}
