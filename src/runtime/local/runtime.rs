// ABOUTME: ContainerRuntime for one container on the local engine.
// ABOUTME: A waiter task records the exit code; a log pump feeds the output sink.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::engine::{CreateRequest, EngineApi, EngineError, PortPublish};
use crate::archive;
use crate::config::{Backend, ContainerSpec, Settings};
use crate::error::{Error, Result};
use crate::logs::LogPump;
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{ContainerRuntime, ExecOutput, ExecRequest};
use crate::runtime::types::Observed;
use crate::state::{LifecycleState, StateMachine};
use crate::types::ContainerId;

/// One container on the local engine.
pub struct LocalRuntime {
    spec: Arc<ContainerSpec>,
    state: Arc<StateMachine>,
    engine: Arc<dyn EngineApi>,
    settings: Settings,
    container: Mutex<Option<ContainerId>>,
    observed: Arc<Observed>,
    waiter: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<LogPump>>,
}

impl LocalRuntime {
    pub fn new(
        spec: Arc<ContainerSpec>,
        state: Arc<StateMachine>,
        engine: Arc<dyn EngineApi>,
        settings: Settings,
    ) -> Self {
        Self {
            spec,
            state,
            engine,
            settings,
            container: Mutex::new(None),
            observed: Arc::new(Observed::default()),
            waiter: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    pub fn container_id(&self) -> Option<ContainerId> {
        self.container.lock().clone()
    }

    fn require_container(&self) -> Result<String> {
        self.container
            .lock()
            .as_ref()
            .map(|id| id.as_str().to_string())
            .ok_or_else(|| Error::Exec(format!("{} has no container yet", self.spec.name)))
    }

    fn create_request(&self) -> CreateRequest {
        let spec = &self.spec;
        let ports = spec
            .exposed_ports
            .values()
            .map(|&port| PortPublish {
                container_port: port,
                host_port: spec.mapped_port(port),
            })
            .collect();
        CreateRequest {
            name: spec.name.clone(),
            image: Some(spec.image.clone()),
            env: spec.env.clone(),
            labels: spec.labels.clone(),
            entrypoint: spec.command.clone(),
            args: spec.args.clone(),
            ports,
            volumes: spec.volumes.clone(),
            resources: spec.resources.clone(),
            network: spec.network.clone(),
        }
    }

    async fn provision(&self) -> Result<String> {
        let name = &self.spec.name;

        match self.engine.remove_container(name, true).await {
            Ok(()) => tracing::info!(container = %name, "removed stale container"),
            Err(EngineError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        if !self.engine.image_exists(&self.spec.image).await? {
            self.engine.pull_image(&self.spec.image).await?;
        }

        let id = self.engine.create_container(&self.create_request()).await?;
        *self.container.lock() = Some(id.clone());
        tracing::debug!(container = %name, id = %id, "created");

        for (key, mount) in &self.spec.files {
            let data = mount.read()?;
            let tar = archive::pack_bytes(mount.file_name(), &data, 0o644)?;
            self.engine
                .upload_archive(id.as_str(), mount.directory(), tar)
                .await
                .map_err(|e| Error::Transfer(format!("file {}: {}", key, e)))?;
        }

        self.engine.start_container(id.as_str()).await?;
        self.observed.mark_started(Utc::now());

        match self.engine.inspect_container(id.as_str()).await {
            Ok(status) => self.observed.set_ip_address(status.ip_address),
            Err(e) => tracing::warn!(container = %name, "inspect after start failed: {}", e),
        }
        self.observed.set_host(Some(self.engine.host()));
        Ok(id.into_inner())
    }

    /// Record the exit code and move to STOPPED once the container exits.
    fn spawn_waiter(&self, id: String) {
        let engine = self.engine.clone();
        let state = self.state.clone();
        let observed = self.observed.clone();
        let name = self.spec.name.clone();
        let task = tokio::spawn(async move {
            match engine.wait_container(&id).await {
                Ok(code) => {
                    tracing::info!(container = %name, "exited with code {}", code);
                    observed.set_exit_code(code);
                    observed.mark_finished(Utc::now());
                    state.try_change(LifecycleState::Stopped);
                }
                Err(e) => tracing::debug!(container = %name, "exit wait ended: {}", e),
            }
        });
        *self.waiter.lock() = Some(task);
    }

    fn attach_output(&self, id: &str) {
        if let Some(sink) = self.spec.output.clone() {
            let pump = LogPump::spawn(self.spec.name.clone(), self.engine.follow_logs(id), sink);
            *self.pump.lock() = Some(pump);
        }
    }

    /// Pick up the exit code right away instead of waiting for the waiter task.
    async fn record_exit(&self, id: &str) {
        if let Ok(status) = self.engine.inspect_container(id).await
            && let Some(code) = status.exit_code
        {
            self.observed.set_exit_code(code);
            self.observed.mark_finished(Utc::now());
        }
    }

    fn release_watchers(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.stop();
        }
        if let Some(waiter) = self.waiter.lock().take() {
            waiter.abort();
        }
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let id = self.require_container()?;
        self.engine
            .download_archive(&id, path)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", path, e)))
    }

    async fn upload(&self, remote_dir: &str, tar: Vec<u8>) -> Result<()> {
        let id = self.require_container()?;
        self.engine
            .upload_archive(&id, remote_dir, tar)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote_dir, e)))
    }
}

impl Sealed for LocalRuntime {}

#[async_trait]
impl ContainerRuntime for LocalRuntime {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn start(&self) -> Result<()> {
        let id = match self.provision().await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(container = %self.spec.name, "start failed: {}", e);
                self.state.try_change(LifecycleState::Failed);
                return Err(e);
            }
        };
        self.state
            .change(LifecycleState::Running, &[LifecycleState::Initializing])?;
        // The waiter starts after RUNNING so a fast exit still lands on STOPPED.
        self.spawn_waiter(id.clone());
        self.attach_output(&id);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(id) = self.container_id() else {
            return Ok(());
        };
        match self
            .engine
            .stop_container(id.as_str(), self.settings.stop_grace_period)
            .await
        {
            Ok(()) => {
                self.record_exit(id.as_str()).await;
                Ok(())
            }
            Err(e) if e.is_gone() => {
                tracing::debug!(container = %self.spec.name, "stop: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn kill(&self) -> Result<()> {
        let Some(id) = self.container_id() else {
            return Ok(());
        };
        match self.engine.kill_container(id.as_str()).await {
            Ok(()) => {
                self.record_exit(id.as_str()).await;
                Ok(())
            }
            Err(e) if e.is_gone() => {
                tracing::debug!(container = %self.spec.name, "kill: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, force: bool) -> Result<()> {
        let Some(id) = self.container_id() else {
            return Ok(());
        };
        if !force {
            match self.engine.inspect_container(id.as_str()).await {
                Ok(status) if status.running => {
                    return Err(EngineError::StillRunning(self.spec.name.clone()).into());
                }
                Ok(_) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        match self.engine.remove_container(id.as_str(), force).await {
            Ok(()) | Err(EngineError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.release_watchers();
        self.observed.mark_finished(Utc::now());
        tracing::info!(container = %self.spec.name, "removed");
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let id = self.require_container()?;
        let call = self.engine.exec(
            &id,
            &request.command,
            request.tty,
            request.working_dir.as_deref(),
            request.stdin.as_deref(),
        );
        let output = match request.timeout.filter(|t| !t.is_zero()) {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                Error::Exec(format!(
                    "{} timed out after {:?}",
                    request.executable(),
                    limit
                ))
            })?,
            None => call.await,
        };
        output.map_err(|e| Error::Exec(e.to_string()))
    }

    async fn put_file(&self, local: &Path, remote_dir: &str, name: &str) -> Result<()> {
        let tar = archive::pack_file(local, name)?;
        self.upload(remote_dir, tar).await
    }

    async fn get_file(&self, remote_dir: &str, name: &str, dest: Option<&Path>) -> Result<PathBuf> {
        let remote = format!("{}/{}", remote_dir.trim_end_matches('/'), name);
        let tar = self.download(&remote).await?;
        let dest = destination(dest)?;
        let written = archive::unpack(&tar, &dest)?;
        let wanted = dest.join(name);
        if written.contains(&wanted) {
            Ok(wanted)
        } else {
            Err(Error::Transfer(format!("{} not found in copied archive", remote)))
        }
    }

    async fn put_directory(&self, local: &Path, remote_dir: &str) -> Result<()> {
        let tar = archive::pack_dir(local)?;
        self.upload(remote_dir, tar).await
    }

    async fn get_directory(&self, remote_dir: &str, dest: Option<&Path>) -> Result<Vec<PathBuf>> {
        let tar = self.download(remote_dir).await?;
        let dest = destination(dest)?;
        archive::unpack(&tar, &dest)
    }

    fn host(&self) -> Option<String> {
        self.observed.host()
    }

    fn ip_address(&self) -> Option<String> {
        self.observed.ip_address()
    }

    fn duration(&self) -> Option<Duration> {
        self.observed.duration()
    }

    fn exit_code(&self) -> Option<i64> {
        self.observed.exit_code()
    }
}

/// `dest` if given, otherwise a fresh directory that outlives this call.
pub(crate) fn destination(dest: Option<&Path>) -> Result<PathBuf> {
    match dest {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Ok(dir.to_path_buf())
        }
        None => Ok(tempfile::Builder::new()
            .prefix("berth-copy-")
            .tempdir()?
            .keep()),
    }
}
