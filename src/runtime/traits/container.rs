// ABOUTME: The runtime contract every backend implements.
// ABOUTME: Provision, stop, kill, delete, exec, file transfer and observed accessors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::exec::{ExecOutput, ExecRequest};
use super::sealed::Sealed;
use crate::config::Backend;
use crate::error::Result;

/// One workload on one backend.
///
/// Runtimes only move the lifecycle state themselves from `start` (to
/// `RUNNING` or `FAILED`) and from their background observers. Guarded
/// user-driven transitions belong to the [`Container`](crate::Container) facade.
#[async_trait]
pub trait ContainerRuntime: Sealed + Send + Sync {
    fn backend(&self) -> Backend;

    /// Provision and launch the workload. Failure leaves the state `FAILED`.
    async fn start(&self) -> Result<()>;

    /// Graceful stop. Idempotent when the workload is already gone.
    async fn stop(&self) -> Result<()>;

    /// Immediate termination. Idempotent when the workload is already gone.
    async fn kill(&self) -> Result<()>;

    /// Release every backend resource created by `start`.
    ///
    /// Without `force` a still running workload is an error.
    async fn delete(&self, force: bool) -> Result<()>;

    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput>;

    /// Copy a local file into `remote_dir` as `name`.
    async fn put_file(&self, local: &Path, remote_dir: &str, name: &str) -> Result<()>;

    /// Copy `remote_dir/name` out of the workload into `dest`, or a fresh
    /// temporary directory. Returns the local path of the copied file.
    async fn get_file(&self, remote_dir: &str, name: &str, dest: Option<&Path>) -> Result<PathBuf>;

    /// Copy a local directory into `remote_dir`. It lands as `remote_dir/<dir name>`.
    async fn put_directory(&self, local: &Path, remote_dir: &str) -> Result<()>;

    /// Copy `remote_dir` out of the workload. Returns every path written.
    async fn get_directory(&self, remote_dir: &str, dest: Option<&Path>) -> Result<Vec<PathBuf>>;

    /// Address clients should use to reach the workload's mapped ports.
    fn host(&self) -> Option<String>;

    fn ip_address(&self) -> Option<String>;

    /// Time since start, or total run time once finished.
    fn duration(&self) -> Option<Duration>;

    fn exit_code(&self) -> Option<i64>;
}
