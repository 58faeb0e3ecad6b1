// ABOUTME: In-memory ClusterApi with controllable pods and watch streams.
// ABOUTME: Tests drive pod phases and job outcomes; the fake records every call.

use async_trait::async_trait;
use berth::logs::LineStream;
use berth::runtime::cluster::resources::{
    ConfigMapSpec, ContainerState, ExposureSpec, JobStatus, Labels, PodPhase, PodStatus,
    WorkloadKind, WorkloadSpec,
};
use berth::runtime::cluster::{ClusterApi, ClusterError, WatchEvent, WatchStream};
use berth::types::PodId;
use berth::{ExecOutput, ExecRequest};
use chrono::Utc;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use super::tarball::{self, Files};

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    workloads: BTreeMap<String, WorkloadSpec>,
    exposures: BTreeMap<String, ExposureSpec>,
    config_maps: BTreeMap<String, ConfigMapSpec>,
    pods: BTreeMap<String, PodStatus>,
    files: HashMap<String, Files>,
    pod_watchers: Vec<(Labels, UnboundedSender<WatchEvent<PodStatus>>)>,
    job_watchers: Vec<(String, UnboundedSender<WatchEvent<JobStatus>>)>,
    calls: Vec<String>,
    execs: Vec<ExecRequest>,
}

pub struct FakeCluster {
    state: Mutex<State>,
    auto_pods: bool,
    can_create_namespaces: bool,
    logs: Vec<String>,
    latency: Duration,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(labels: &Labels, selector: &Labels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl FakeCluster {
    pub fn new() -> Self {
        let mut state = State::default();
        state.namespaces.insert("default".to_string());
        Self {
            state: Mutex::new(state),
            auto_pods: true,
            can_create_namespaces: true,
            logs: Vec::new(),
            latency: Duration::ZERO,
        }
    }

    /// Workload submits and deletes take `latency` before they land.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn lag(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Workloads never get pods.
    pub fn without_pods(mut self) -> Self {
        self.auto_pods = false;
        self
    }

    pub fn deny_namespace_creation(mut self) -> Self {
        self.can_create_namespaces = false;
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Seed a config map as if left behind by an earlier run.
    pub fn with_config_map(self, config_map: ConfigMapSpec) -> Self {
        self.state
            .lock()
            .config_maps
            .insert(config_map.name.clone(), config_map);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn execs(&self) -> Vec<ExecRequest> {
        self.state.lock().execs.clone()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().namespaces.iter().cloned().collect()
    }

    pub fn workload(&self, name: &str) -> Option<WorkloadSpec> {
        self.state.lock().workloads.get(name).cloned()
    }

    pub fn exposure(&self, name: &str) -> Option<ExposureSpec> {
        self.state.lock().exposures.get(name).cloned()
    }

    pub fn config_map_names(&self) -> Vec<String> {
        self.state.lock().config_maps.keys().cloned().collect()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.state.lock().pods.keys().cloned().collect()
    }

    pub fn file(&self, pod: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .files
            .get(pod)
            .and_then(|files| files.get(path).cloned())
    }

    /// Move a pod to `phase` and notify watchers.
    pub fn set_phase(&self, pod: &str, phase: PodPhase) {
        let mut state = self.state.lock();
        let Some(status) = state.pods.get_mut(pod) else {
            return;
        };
        status.phase = phase;
        if status.phase == PodPhase::Running && status.started_at.is_none() {
            status.started_at = Some(Utc::now());
        }
        let status = status.clone();
        notify_pods(&mut state, WatchEvent::Modified(status));
    }

    /// Terminate a pod's container with `code`.
    pub fn finish(&self, pod: &str, code: i64) {
        let mut state = self.state.lock();
        let Some(status) = state.pods.get_mut(pod) else {
            return;
        };
        status.phase = if code == 0 {
            PodPhase::Succeeded
        } else {
            PodPhase::Failed
        };
        for container in &mut status.containers {
            container.exit_code = Some(code);
            container.finished_at = Some(Utc::now());
        }
        let status = status.clone();
        notify_pods(&mut state, WatchEvent::Modified(status));
    }

    /// Remove a pod behind the runtime's back.
    pub fn vanish(&self, pod: &str) {
        let mut state = self.state.lock();
        if let Some(status) = state.pods.remove(pod) {
            notify_pods(&mut state, WatchEvent::Deleted(status));
        }
    }

    /// Remove a pod without telling any watcher.
    pub fn forget_pod(&self, pod: &str) {
        self.state.lock().pods.remove(pod);
    }

    /// End every open pod watch, with an error event if `error` is set.
    pub fn close_pod_watches(&self, error: Option<&str>) {
        let mut state = self.state.lock();
        for (_, tx) in state.pod_watchers.drain(..) {
            if let Some(message) = error {
                let _ = tx.unbounded_send(WatchEvent::Error(message.to_string()));
            }
        }
    }

    /// Report a job status to its watchers.
    pub fn job_event(&self, event: WatchEvent<JobStatus>) {
        let mut state = self.state.lock();
        let name = match &event {
            WatchEvent::Added(j) | WatchEvent::Modified(j) | WatchEvent::Deleted(j) => {
                Some(j.name.clone())
            }
            WatchEvent::Error(_) => None,
        };
        state.job_watchers.retain(|(job, tx)| {
            if name.as_ref().is_some_and(|n| n != job) {
                return !tx.is_closed();
            }
            tx.unbounded_send(event.clone()).is_ok()
        });
    }

    /// End every open job watch without an event.
    pub fn close_job_watches(&self) {
        self.state.lock().job_watchers.clear();
    }

    pub fn job_watch_count(&self) -> usize {
        self.state.lock().job_watchers.len()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    fn spawn_pod(&self, state: &mut State, workload: &WorkloadSpec) {
        let name = format!("{}-0", workload.name);
        let status = PodStatus {
            name: PodId::new(name.clone()),
            namespace: workload.namespace.clone(),
            phase: PodPhase::Pending,
            pod_ip: Some("10.1.0.7".to_string()),
            host_ip: Some("10.0.0.5".to_string()),
            started_at: None,
            labels: workload.template.labels.clone(),
            containers: vec![ContainerState {
                name: workload.template.container.name.clone(),
                ready: false,
                exit_code: None,
                started_at: None,
                finished_at: None,
            }],
        };
        state.pods.insert(name, status.clone());
        notify_pods(state, WatchEvent::Added(status));
    }

    fn remove_pods(state: &mut State, selector: &Labels) {
        let names: Vec<String> = state
            .pods
            .iter()
            .filter(|(_, p)| matches(&p.labels, selector))
            .map(|(n, _)| n.clone())
            .collect();
        for name in names {
            if let Some(status) = state.pods.remove(&name) {
                notify_pods(state, WatchEvent::Deleted(status));
            }
        }
    }
}

fn notify_pods(state: &mut State, event: WatchEvent<PodStatus>) {
    let labels = match &event {
        WatchEvent::Added(p) | WatchEvent::Modified(p) | WatchEvent::Deleted(p) => p.labels.clone(),
        WatchEvent::Error(_) => Labels::new(),
    };
    state.pod_watchers.retain(|(selector, tx)| {
        if !matches(&labels, selector) {
            return !tx.is_closed();
        }
        tx.unbounded_send(event.clone()).is_ok()
    });
}

fn not_found(kind: &'static str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn output(exit_code: i64, stdout: impl Into<Vec<u8>>, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stdout: stdout.into(),
        stderr: Some(stderr.as_bytes().to_vec()),
    }
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Interpret the small command vocabulary the runtime sends. Unknown
/// programs fail to launch, as they do on a real exec channel.
fn run(files: &mut Files, command: &[String], stdin: Option<&[u8]>) -> Result<ExecOutput, String> {
    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["sh", "-c", script, dir, rest @ ..] if script.starts_with("cd ") => {
            if rest.first() == Some(&"pwd") {
                return Ok(output(0, format!("{dir}\n"), ""));
            }
            let rest: Vec<String> = rest.iter().map(|s| s.to_string()).collect();
            run(files, &rest, stdin)
        }
        ["sh", "-c", script, dir] if script.contains("tar xf") => {
            Ok(match tarball::extract(files, dir, stdin.unwrap_or_default()) {
                Ok(()) => output(0, Vec::new(), ""),
                Err(e) => output(2, Vec::new(), &e.to_string()),
            })
        }
        ["tar", "cf", "-", "-C", dir, name] => Ok(match tarball::archive(files, &join(dir, name)) {
            Some(tar) => output(0, tar, ""),
            None => output(2, Vec::new(), &format!("tar: {name}: No such file or directory")),
        }),
        ["echo", rest @ ..] => Ok(output(0, format!("{}\n", rest.join(" ")), "")),
        ["sh", "-c", _] => Ok(output(0, "out\n", "err\n")),
        ["false"] => Ok(output(1, Vec::new(), "")),
        [program, ..] => Err(format!("executable file not found in $PATH: {program}")),
        [] => Err("empty command".to_string()),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn can_i(
        &self,
        verb: &str,
        resource: &str,
        _namespace: Option<&str>,
    ) -> Result<bool, ClusterError> {
        self.record(format!("can_i {verb} {resource}"));
        Ok(self.can_create_namespaces)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        Ok(self.state.lock().namespaces.contains(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if !state.namespaces.insert(namespace.to_string()) {
            return Err(ClusterError::AlreadyExists {
                kind: "namespace",
                name: namespace.to_string(),
            });
        }
        state.calls.push(format!("create_namespace {namespace}"));
        Ok(())
    }

    async fn apply_workload(&self, workload: &WorkloadSpec) -> Result<(), ClusterError> {
        self.lag().await;
        let mut state = self.state.lock();
        state
            .calls
            .push(format!("apply {} {}", workload.kind, workload.name));
        state
            .workloads
            .insert(workload.name.clone(), workload.clone());
        if self.auto_pods {
            self.spawn_pod(&mut state, workload);
        }
        Ok(())
    }

    async fn workload_exists(
        &self,
        _namespace: &str,
        _kind: WorkloadKind,
        name: &str,
    ) -> Result<bool, ClusterError> {
        Ok(self.state.lock().workloads.contains_key(name))
    }

    async fn scale_workload(
        &self,
        _namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("scale {name} {replicas}"));
        let workload = state
            .workloads
            .get_mut(name)
            .ok_or_else(|| not_found("workload", name))?;
        workload.replicas = replicas;
        let selector = workload.selector.clone();
        if replicas == 0 {
            Self::remove_pods(&mut state, &selector);
        }
        Ok(())
    }

    async fn delete_workload(
        &self,
        _namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.lag().await;
        let mut state = self.state.lock();
        state.calls.push(format!("delete {kind} {name}"));
        let workload = state
            .workloads
            .remove(name)
            .ok_or_else(|| not_found("workload", name))?;
        Self::remove_pods(&mut state, &workload.selector);
        Ok(())
    }

    async fn create_exposure(&self, exposure: &ExposureSpec) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("expose {}", exposure.name));
        state
            .exposures
            .insert(exposure.name.clone(), exposure.clone());
        Ok(())
    }

    async fn exposure_exists(&self, _namespace: &str, name: &str) -> Result<bool, ClusterError> {
        Ok(self.state.lock().exposures.contains_key(name))
    }

    async fn delete_exposure(&self, _namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete exposure {name}"));
        state
            .exposures
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("exposure", name))
    }

    async fn create_config_map(&self, config_map: &ConfigMapSpec) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if state.config_maps.contains_key(&config_map.name) {
            return Err(ClusterError::AlreadyExists {
                kind: "config map",
                name: config_map.name.clone(),
            });
        }
        state.calls.push(format!("create config map {}", config_map.name));
        state
            .config_maps
            .insert(config_map.name.clone(), config_map.clone());
        Ok(())
    }

    async fn list_config_maps(
        &self,
        _namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<String>, ClusterError> {
        Ok(self
            .state
            .lock()
            .config_maps
            .values()
            .filter(|m| matches(&m.labels, selector))
            .map(|m| m.name.clone())
            .collect())
    }

    async fn delete_config_map(&self, _namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete config map {name}"));
        state
            .config_maps
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("config map", name))
    }

    async fn list_pods(
        &self,
        _namespace: &str,
        selector: &Labels,
    ) -> Result<Vec<PodStatus>, ClusterError> {
        Ok(self
            .state
            .lock()
            .pods
            .values()
            .filter(|p| matches(&p.labels, selector))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Option<PodStatus>, ClusterError> {
        Ok(self.state.lock().pods.get(name).cloned())
    }

    async fn delete_pod(
        &self,
        _namespace: &str,
        name: &str,
        grace: Duration,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete pod {name} {}s", grace.as_secs()));
        let status = state
            .pods
            .remove(name)
            .ok_or_else(|| not_found("pod", name))?;
        notify_pods(&mut state, WatchEvent::Deleted(status));
        Ok(())
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        selector: &Labels,
    ) -> Result<WatchStream<PodStatus>, ClusterError> {
        let (tx, rx) = unbounded();
        self.state.lock().pod_watchers.push((selector.clone(), tx));
        Ok(rx.boxed())
    }

    async fn watch_job(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<WatchStream<JobStatus>, ClusterError> {
        let (tx, rx) = unbounded();
        self.state.lock().job_watchers.push((name.to_string(), tx));
        Ok(rx.boxed())
    }

    async fn pod_logs(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
    ) -> Result<LineStream, ClusterError> {
        if !self.state.lock().pods.contains_key(pod) {
            return Err(not_found("pod", pod));
        }
        let lines: Vec<_> = self.logs.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(lines).boxed())
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        _container: &str,
        request: &ExecRequest,
    ) -> Result<ExecOutput, ClusterError> {
        let mut state = self.state.lock();
        if !state.pods.contains_key(pod) {
            return Err(not_found("pod", pod));
        }
        state.execs.push(request.clone());
        let files = state.files.entry(pod.to_string()).or_default();
        run(files, &request.command, request.stdin.as_deref()).map_err(ClusterError::Exec)
    }
}
