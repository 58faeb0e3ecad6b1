// ABOUTME: EngineApi over bollard, for Docker and Podman sockets alike.
// ABOUTME: Maps engine HTTP status codes onto EngineError variants.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, DownloadFromContainerOptions,
    InspectContainerOptions, KillContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::detection::{EngineEndpoint, EngineKind, detect_local};
use super::engine::{ContainerStatus, CreateRequest, EngineApi, EngineError};
use crate::logs::{LineStream, split_lines};
use crate::runtime::traits::ExecOutput;
use crate::types::{ContainerId, ImageRef};

type BollardError = bollard::errors::Error;

fn status_of(e: &BollardError) -> Option<(u16, &str)> {
    match e {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn map_create_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::ImageNotFound(msg.to_string()),
        Some((409, msg)) => EngineError::AlreadyExists(msg.to_string()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_start_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::NotFound(msg.to_string()),
        Some((304, msg)) => EngineError::AlreadyRunning(msg.to_string()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_stop_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::NotFound(msg.to_string()),
        Some((304, msg)) | Some((409, msg)) => EngineError::NotRunning(msg.to_string()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_not_found_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::NotFound(msg.to_string()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_exec_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::NotFound(msg.to_string()),
        Some((409, msg)) => EngineError::NotRunning(msg.to_string()),
        _ => EngineError::Exec(e.to_string()),
    }
}

fn map_archive_error(e: BollardError) -> EngineError {
    match status_of(&e) {
        Some((404, msg)) => EngineError::NotFound(msg.to_string()),
        _ => EngineError::Archive(e.to_string()),
    }
}

/// Local engine client over a unix socket.
pub struct BollardEngine {
    client: Docker,
    kind: EngineKind,
}

impl std::fmt::Debug for BollardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BollardEngine")
            .field("kind", &self.kind)
            .finish()
    }
}

impl BollardEngine {
    pub fn new(client: Docker, kind: EngineKind) -> Self {
        Self { client, kind }
    }

    pub fn connect(endpoint: &EngineEndpoint) -> Result<Self, EngineError> {
        let client =
            Docker::connect_with_unix(&endpoint.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| EngineError::Connection(e.to_string()))?;
        tracing::debug!(
            "connected to {} at {}",
            endpoint.kind,
            endpoint.socket_path
        );
        Ok(Self::new(client, endpoint.kind))
    }

    /// Detect the local socket and connect to it.
    pub fn connect_local() -> Result<Self, EngineError> {
        let endpoint = detect_local().map_err(|e| EngineError::Connection(e.to_string()))?;
        Self::connect(&endpoint)
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    fn host_config(request: &CreateRequest) -> HostConfig {
        let mut host_config = HostConfig::default();

        let resources = &request.resources;
        if let Some(limit) = resources.memory_limit {
            host_config.memory = Some(limit as i64);
        }
        if let Some(reservation) = resources.memory_request {
            host_config.memory_reservation = Some(reservation as i64);
        }
        if let Some(cpus) = resources.cpu_limit {
            host_config.nano_cpus = Some((cpus * 1_000_000_000.0) as i64);
        }
        if let Some(cpus) = resources.cpu_request {
            host_config.cpu_shares = Some((cpus * 1024.0) as i64);
        }

        let mounts: Vec<Mount> = request
            .volumes
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();
        if !mounts.is_empty() {
            host_config.mounts = Some(mounts);
        }

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for port in &request.ports {
            if let Some(host_port) = port.host_port {
                port_bindings.insert(
                    format!("{}/tcp", port.container_port),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(host_port.to_string()),
                    }]),
                );
            }
        }
        if !port_bindings.is_empty() {
            host_config.port_bindings = Some(port_bindings);
        }

        if let Some(ref network) = request.network {
            host_config.network_mode = Some(network.clone());
        }
        host_config
    }
}

#[async_trait]
impl EngineApi for BollardEngine {
    async fn image_exists(&self, image: &ImageRef) -> Result<bool, EngineError> {
        let name = image.to_string();
        match self.client.inspect_image(&name).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(EngineError::Runtime(format!(
                "failed to inspect {}: {}",
                name, e
            ))),
        }
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<(), EngineError> {
        let name = image.to_string();
        tracing::info!(engine = %self.kind, "pulling {}", name);
        let opts = CreateImageOptions {
            from_image: Some(name.clone()),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| EngineError::PullFailed(format!("{}: {}", name, e)))?;
        }
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<ContainerId, EngineError> {
        let env: Vec<String> = request
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let labels: HashMap<String, String> = request
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let exposed_ports: Vec<String> = request
            .ports
            .iter()
            .map(|p| format!("{}/tcp", p.container_port))
            .collect();

        let body = ContainerCreateBody {
            image: request.image.as_ref().map(|i| i.to_string()),
            env: (!env.is_empty()).then_some(env),
            labels: (!labels.is_empty()).then_some(labels),
            entrypoint: request.entrypoint.clone(),
            cmd: (!request.args.is_empty()).then(|| request.args.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(Self::host_config(request)),
            ..Default::default()
        };
        let opts = CreateContainerOptions {
            name: Some(request.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_create_error)?;
        for warning in &response.warnings {
            tracing::warn!(container = %request.name, "engine warning: {}", warning);
        }
        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(map_start_error)
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let opts = StopContainerOptions {
            t: Some(grace.as_secs() as i32),
            signal: None,
        };
        self.client
            .stop_container(id, Some(opts))
            .await
            .map_err(map_stop_error)
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .kill_container(id, None::<KillContainerOptions>)
            .await
            .map_err(map_stop_error)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(id, Some(opts))
            .await
            .map_err(map_not_found_error)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerStatus, EngineError> {
        let details = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_not_found_error)?;

        let state = details.state.as_ref();
        let ip_address = details
            .network_settings
            .as_ref()
            .and_then(|s| s.networks.as_ref())
            .and_then(|nets| {
                nets.values()
                    .filter_map(|endpoint| endpoint.ip_address.clone())
                    .find(|ip| !ip.is_empty())
            });

        Ok(ContainerStatus {
            id: details.id.unwrap_or_else(|| id.to_string()),
            running: state.and_then(|s| s.running).unwrap_or(false),
            exit_code: state.and_then(|s| s.exit_code),
            ip_address,
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let mut stream = self.client.wait_container(id, None::<WaitContainerOptions>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(map_not_found_error(e)),
            None => Err(EngineError::Runtime(format!(
                "wait for {} ended without a status",
                id
            ))),
        }
    }

    async fn exec(
        &self,
        id: &str,
        command: &[String],
        tty: bool,
        working_dir: Option<&str>,
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, EngineError> {
        let config = bollard::models::ExecConfig {
            cmd: Some(command.to_vec()),
            working_dir: working_dir.map(str::to_string),
            attach_stdin: Some(stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(tty),
            ..Default::default()
        };
        let exec_id = self
            .client
            .create_exec(id, config)
            .await
            .map_err(map_exec_error)?
            .id;

        let opts = StartExecOptions {
            detach: false,
            tty,
            ..Default::default()
        };
        let started = self
            .client
            .start_exec(&exec_id, Some(opts))
            .await
            .map_err(map_exec_error)?;

        let mut merged = Vec::new();
        if let StartExecResults::Attached {
            mut output,
            mut input,
        } = started
        {
            if let Some(data) = stdin {
                input
                    .write_all(data)
                    .await
                    .map_err(|e| EngineError::Exec(format!("writing stdin: {}", e)))?;
                input
                    .shutdown()
                    .await
                    .map_err(|e| EngineError::Exec(format!("closing stdin: {}", e)))?;
            }
            drop(input);

            while let Some(frame) = output.next().await {
                match frame {
                    Ok(LogOutput::StdOut { message })
                    | Ok(LogOutput::StdErr { message })
                    | Ok(LogOutput::Console { message }) => merged.extend_from_slice(&message),
                    Ok(LogOutput::StdIn { .. }) => {}
                    Err(e) => {
                        // The exit code from inspect is authoritative; Podman in
                        // particular drops attached streams after the command ends.
                        tracing::error!(engine = %self.kind, "exec stream error ignored: {}", e);
                        break;
                    }
                }
            }
        }

        let details = self
            .client
            .inspect_exec(&exec_id)
            .await
            .map_err(map_exec_error)?;
        let exit_code = details
            .exit_code
            .ok_or_else(|| EngineError::Exec(format!("exec {} reported no exit code", exec_id)))?;

        Ok(ExecOutput {
            exit_code,
            stdout: merged,
            stderr: None,
        })
    }

    async fn upload_archive(
        &self,
        id: &str,
        dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let opts = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        let body = Either::Left(Full::new(Bytes::from(archive)));
        self.client
            .upload_to_container(id, Some(opts), body)
            .await
            .map_err(map_archive_error)
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let opts = DownloadFromContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.download_from_container(id, Some(opts));
        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk.map_err(map_archive_error)?);
        }
        Ok(archive)
    }

    fn follow_logs(&self, id: &str) -> LineStream {
        let opts = LogsOptions {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let frames = self
            .client
            .logs(id, Some(opts))
            .map(|frame| frame.map(LogOutput::into_bytes));
        split_lines(frames)
    }
}
