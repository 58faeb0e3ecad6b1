// ABOUTME: ContainerRuntime for a workload on the cluster orchestrator.
// ABOUTME: Services scale to zero on stop; tasks run once and are deleted on stop.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::api::{ClusterApi, ClusterError};
use super::exposure::{exposure_for, service_dns};
use super::manifest;
use super::resources::{ExposureSpec, Labels, PodStatus, WorkloadKind};
use super::watch::{PodTracker, PodWatch};
use crate::archive;
use crate::config::{Backend, ContainerSpec, Settings};
use crate::error::{Error, Result};
use crate::logs::LogPump;
use crate::runtime::local::destination;
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{ContainerRuntime, ExecOutput, ExecRequest};
use crate::runtime::types::Observed;
use crate::state::{LifecycleState, StateMachine};

/// One workload on the cluster.
pub struct ClusterRuntime {
    spec: Arc<ContainerSpec>,
    kind: WorkloadKind,
    in_cluster: bool,
    settings: Settings,
    selector: Labels,
    tracker: PodTracker,
    config_maps: Mutex<Vec<String>>,
    exposure: Mutex<Option<ExposureSpec>>,
    watch: Mutex<Option<PodWatch>>,
    pump: Arc<Mutex<Option<LogPump>>>,
    log_attach: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterRuntime {
    pub fn new(
        spec: Arc<ContainerSpec>,
        state: Arc<StateMachine>,
        api: Arc<dyn ClusterApi>,
        kind: WorkloadKind,
        in_cluster: bool,
        settings: Settings,
    ) -> Self {
        let tracker = PodTracker {
            api,
            namespace: spec.namespace.clone(),
            container: spec.name.clone(),
            pods: Arc::new(Mutex::new(Vec::new())),
            state,
            observed: Arc::new(Observed::default()),
        };
        Self {
            selector: manifest::selector(&spec.name),
            spec,
            kind,
            in_cluster,
            settings,
            tracker,
            config_maps: Mutex::new(Vec::new()),
            exposure: Mutex::new(None),
            watch: Mutex::new(None),
            pump: Arc::new(Mutex::new(None)),
            log_attach: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    /// Names of the config maps this runtime created.
    pub fn config_maps(&self) -> Vec<String> {
        self.config_maps.lock().clone()
    }

    fn api(&self) -> &dyn ClusterApi {
        self.tracker.api.as_ref()
    }

    fn namespace(&self) -> &str {
        &self.spec.namespace
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn ensure_namespace(&self) -> Result<()> {
        let ns = self.namespace();
        match self.api().namespace_exists(ns).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(ClusterError::Forbidden(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if !self
            .api()
            .can_i("create", "namespaces", None)
            .await
            .unwrap_or(false)
        {
            tracing::debug!(namespace = %ns, "not allowed to create namespace, skipping");
            return Ok(());
        }
        match self.api().create_namespace(ns).await {
            Ok(()) => {
                tracing::info!(namespace = %ns, "created namespace");
                Ok(())
            }
            Err(ClusterError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Poll `exists` until it reports false or the delete timeout passes.
    async fn wait_gone<F, Fut>(&self, kind: &'static str, exists: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<bool, ClusterError>>,
    {
        let timeout = self.settings.resource_delete_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if !exists().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClusterError::DeleteTimeout {
                    kind,
                    name: self.name().to_string(),
                    timeout,
                }
                .into());
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn remove_exposure(&self) -> Result<()> {
        let (ns, name) = (self.namespace(), self.name());
        if !self.api().exposure_exists(ns, name).await? {
            return Ok(());
        }
        match self.api().delete_exposure(ns, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.wait_gone("exposure", || self.api().exposure_exists(ns, name))
            .await
    }

    async fn remove_workload(&self) -> Result<()> {
        let (ns, name, kind) = (self.namespace(), self.name(), self.kind);
        if !self.api().workload_exists(ns, kind, name).await? {
            return Ok(());
        }
        match self.api().delete_workload(ns, kind, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.wait_gone("workload", || self.api().workload_exists(ns, kind, name))
            .await
    }

    /// Delete labelled config maps whose names are also in `names`.
    async fn remove_config_maps(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let listed = self
            .api()
            .list_config_maps(self.namespace(), &self.selector)
            .await?;
        for name in listed.iter().filter(|n| names.contains(n)) {
            match self.api().delete_config_map(self.namespace(), name).await {
                Ok(()) => tracing::debug!(config_map = %name, "deleted"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn wait_for_pods(&self) -> Result<Vec<PodStatus>> {
        let timeout = self.settings.pod_ready_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let pods = self.api().list_pods(self.namespace(), &self.selector).await?;
            if !pods.is_empty() {
                return Ok(pods);
            }
            if Instant::now() >= deadline {
                return Err(ClusterError::NoPods {
                    selector: super::resources::selector_string(&self.selector),
                    timeout,
                }
                .into());
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn provision(&self) -> Result<()> {
        self.ensure_namespace().await?;

        let config_maps = manifest::config_maps(&self.spec)?;
        let map_names: Vec<String> = config_maps.iter().map(|m| m.name.clone()).collect();
        self.remove_exposure().await?;
        self.remove_workload().await?;
        self.remove_config_maps(&map_names).await?;

        for config_map in &config_maps {
            self.api().create_config_map(config_map).await?;
            self.config_maps.lock().push(config_map.name.clone());
        }

        let workload = manifest::workload(&self.spec, self.kind);
        self.api().apply_workload(&workload).await?;
        tracing::info!(container = %self.name(), kind = %self.kind, "workload submitted");

        if let Some(exposure) = exposure_for(&self.spec, self.in_cluster, &self.selector) {
            self.api().create_exposure(&exposure).await?;
            *self.exposure.lock() = Some(exposure);
        }

        let pods = self.wait_for_pods().await?;
        for pod in &pods {
            self.tracker.track(&pod.name);
        }
        let events = self
            .api()
            .watch_pods(self.namespace(), &self.selector)
            .await?;
        *self.watch.lock() = Some(PodWatch::spawn(self.tracker.clone(), events));
        for pod in &pods {
            self.tracker.apply(pod);
        }

        self.attach_output();
        Ok(())
    }

    /// Follow the first pod's logs once it is running, or finished already.
    fn attach_output(&self) {
        let (Some(sink), Some(pod)) = (self.spec.output.clone(), self.tracker.first_pod()) else {
            return;
        };
        let api = self.tracker.api.clone();
        let state = self.tracker.state.clone();
        let slot = self.pump.clone();
        let namespace = self.spec.namespace.clone();
        let container = self.spec.name.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = state.wait_for_state(LifecycleState::Running, None) => {}
                _ = state.wait_for_completion(None) => {}
            }
            match api.pod_logs(&namespace, pod.as_str(), &container).await {
                Ok(lines) => *slot.lock() = Some(LogPump::spawn(pod.as_str(), lines, sink)),
                Err(e) => tracing::warn!(pod = %pod, "cannot follow logs: {}", e),
            }
        });
        *self.log_attach.lock() = Some(task);
    }

    fn release_watchers(&self) {
        if let Some(task) = self.log_attach.lock().take() {
            task.abort();
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.stop();
        }
        if let Some(watch) = self.watch.lock().take() {
            watch.stop();
        }
    }

    async fn kill_pods(&self) -> Result<()> {
        let pods: Vec<_> = self.tracker.pods.lock().clone();
        for pod in pods {
            match self
                .api()
                .delete_pod(self.namespace(), pod.as_str(), Duration::ZERO)
                .await
            {
                Ok(()) => tracing::debug!(pod = %pod, "killed"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn run(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let pod = self
            .tracker
            .first_pod()
            .ok_or_else(|| Error::Exec(format!("{} has no pod", self.name())))?;
        let request = in_working_dir(request);
        let call = self
            .api()
            .exec(self.namespace(), pod.as_str(), self.name(), &request);
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

    /// Run a tar command for a file transfer; any failure is a transfer error.
    async fn tar(&self, request: ExecRequest) -> Result<Vec<u8>> {
        let output = self
            .run(&request)
            .await
            .map_err(|e| Error::Transfer(e.to_string()))?;
        if !output.success() {
            return Err(Error::Transfer(format!(
                "tar exited with {}: {}",
                output.exit_code,
                output.stderr_text().unwrap_or_default().trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn extract(&self, remote_dir: &str, tar: Vec<u8>) -> Result<()> {
        let script = "mkdir -p \"$0\" && tar xf - -C \"$0\"";
        self.tar(ExecRequest::new("sh", ["-c", script, remote_dir]).stdin(tar))
            .await
            .map(|_| ())
    }
}

/// Exec has no working directory of its own; wrap the command in a `cd`.
fn in_working_dir(request: &ExecRequest) -> ExecRequest {
    let Some(dir) = &request.working_dir else {
        return request.clone();
    };
    let mut command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "cd \"$0\" && exec \"$@\"".to_string(),
        dir.clone(),
    ];
    command.extend(request.command.iter().cloned());
    ExecRequest {
        command,
        working_dir: None,
        ..request.clone()
    }
}

fn split_remote(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", base)) => ("/".to_string(), base.to_string()),
        Some((parent, base)) => (parent.to_string(), base.to_string()),
        None => (".".to_string(), trimmed.to_string()),
    }
}

impl Sealed for ClusterRuntime {}

#[async_trait]
impl ContainerRuntime for ClusterRuntime {
    fn backend(&self) -> Backend {
        Backend::Cluster
    }

    async fn start(&self) -> Result<()> {
        match self.provision().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(container = %self.name(), "start failed: {}", e);
                self.tracker.state.try_change(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        let (ns, name, kind) = (self.namespace(), self.name(), self.kind);
        if !self.api().workload_exists(ns, kind, name).await? {
            tracing::warn!(container = %name, "stop: {} already removed", kind);
            return Ok(());
        }
        let result = match kind {
            WorkloadKind::Service => self.api().scale_workload(ns, name, 0).await,
            WorkloadKind::Task => self.api().delete_workload(ns, kind, name).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn kill(&self) -> Result<()> {
        self.kill_pods().await?;
        self.stop().await
    }

    async fn delete(&self, force: bool) -> Result<()> {
        self.release_watchers();
        if force {
            self.kill_pods().await?;
        }
        self.remove_exposure().await?;
        self.remove_workload().await?;
        let tracked = self.config_maps();
        self.remove_config_maps(&tracked).await?;
        self.config_maps.lock().clear();
        tracing::info!(container = %self.name(), "cluster resources removed");
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        self.run(request).await
    }

    async fn put_file(&self, local: &Path, remote_dir: &str, name: &str) -> Result<()> {
        let tar = archive::pack_file(local, name)?;
        self.extract(remote_dir, tar).await
    }

    async fn get_file(&self, remote_dir: &str, name: &str, dest: Option<&Path>) -> Result<PathBuf> {
        let tar = self
            .tar(ExecRequest::new("tar", ["cf", "-", "-C", remote_dir, name]))
            .await?;
        let dest = destination(dest)?;
        let written = archive::unpack(&tar, &dest)?;
        let wanted = dest.join(name);
        if written.contains(&wanted) {
            Ok(wanted)
        } else {
            Err(Error::Transfer(format!(
                "{}/{} not found in copied archive",
                remote_dir, name
            )))
        }
    }

    async fn put_directory(&self, local: &Path, remote_dir: &str) -> Result<()> {
        let tar = archive::pack_dir(local)?;
        self.extract(remote_dir, tar).await
    }

    async fn get_directory(&self, remote_dir: &str, dest: Option<&Path>) -> Result<Vec<PathBuf>> {
        let (parent, base) = split_remote(remote_dir);
        let tar = self
            .tar(ExecRequest::new("tar", ["cf", "-", "-C", parent.as_str(), base.as_str()]))
            .await?;
        let dest = destination(dest)?;
        archive::unpack(&tar, &dest)
    }

    fn host(&self) -> Option<String> {
        if self.in_cluster && self.exposure.lock().is_some() {
            return Some(service_dns(self.name(), self.namespace()));
        }
        self.tracker.observed.host()
    }

    fn ip_address(&self) -> Option<String> {
        self.tracker.observed.ip_address()
    }

    fn duration(&self) -> Option<Duration> {
        self.tracker.observed.duration()
    }

    fn exit_code(&self) -> Option<i64> {
        self.tracker.observed.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_dir_wraps_command() {
        let req = ExecRequest::new("ls", ["-l"]).working_dir("/srv");
        let wrapped = in_working_dir(&req);
        assert_eq!(
            wrapped.command,
            vec!["sh", "-c", "cd \"$0\" && exec \"$@\"", "/srv", "ls", "-l"]
        );
        assert!(wrapped.working_dir.is_none());
    }

    #[test]
    fn remote_paths_split_into_parent_and_base() {
        assert_eq!(split_remote("/var/log/app/"), ("/var/log".into(), "app".into()));
        assert_eq!(split_remote("/data"), ("/".into(), "data".into()));
        assert_eq!(split_remote("rel"), (".".into(), "rel".into()));
    }
}
