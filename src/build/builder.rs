// ABOUTME: Runs one image build as a cluster task and tracks it to completion.
// ABOUTME: Submits the builder job, follows its logs and watches the job's conditions.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use snafu::{ResultExt, ensure};
use std::sync::Arc;
use tokio::time::Instant;

use super::context::{ResolvedContext, resolve};
use super::error::{BuildError, ClusterSnafu, IllegalStateSnafu, MissingFieldSnafu, NoBuilderPodSnafu};
use super::spec::{BuildSpec, BuildState};
use crate::config::{OutputSink, Settings};
use crate::logs::LogPump;
use crate::runtime::Backends;
use crate::runtime::cluster::manifest;
use crate::runtime::cluster::resources::{
    ContainerTemplate, JobStatus, MountPoint, PodTemplate, ResourceRequirements, Volume,
    VolumeSource, WorkloadKind, WorkloadSpec,
};
use crate::runtime::cluster::{ClusterApi, WatchEvent};
use crate::types::{ImageRef, PodId};

/// One image build. Runs at most once.
pub struct ImageBuilder {
    spec: BuildSpec,
    api: Arc<dyn ClusterApi>,
    settings: Settings,
    in_cluster: bool,
    state: Mutex<BuildState>,
    started: Mutex<Option<DateTime<Utc>>>,
    finished: Mutex<Option<DateTime<Utc>>>,
    pump: Mutex<Option<LogPump>>,
}

impl ImageBuilder {
    pub fn new(spec: BuildSpec, api: Arc<dyn ClusterApi>, settings: Settings, in_cluster: bool) -> Self {
        Self {
            spec,
            api,
            settings,
            in_cluster,
            state: Mutex::new(BuildState::Initialized),
            started: Mutex::new(None),
            finished: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    pub fn from_backends(spec: BuildSpec, backends: &Backends) -> crate::error::Result<Self> {
        Ok(Self::new(
            spec,
            backends.cluster()?,
            backends.settings().clone(),
            backends.is_in_cluster(),
        ))
    }

    pub fn state(&self) -> BuildState {
        *self.state.lock()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        *self.started.lock()
    }

    pub fn finish_time(&self) -> Option<DateTime<Utc>> {
        *self.finished.lock()
    }

    pub fn image_references(&self) -> Vec<ImageRef> {
        self.spec.image_references()
    }

    fn advance(&self, next: BuildState) {
        let mut state = self.state.lock();
        if state.can_transition_to(next) {
            tracing::info!(build = %self.spec.name, "build {} -> {}", *state, next);
            *state = next;
            match next {
                BuildState::InProgress => *self.started.lock() = Some(Utc::now()),
                BuildState::Completed | BuildState::Failed => {
                    *self.finished.lock() = Some(Utc::now())
                }
                BuildState::Initialized => {}
            }
        }
    }

    /// Move INITIALIZED to IN_PROGRESS under the state lock, so only one
    /// caller ever submits the job.
    fn claim(&self) -> Result<(), BuildError> {
        let mut state = self.state.lock();
        ensure!(
            *state == BuildState::Initialized,
            IllegalStateSnafu {
                name: self.spec.name.clone(),
                actual: *state
            }
        );
        *state = BuildState::InProgress;
        *self.started.lock() = Some(Utc::now());
        tracing::info!(
            build = %self.spec.name,
            "build {} -> {}",
            BuildState::Initialized,
            BuildState::InProgress
        );
        Ok(())
    }

    fn cluster_err(&self) -> ClusterSnafu<String> {
        ClusterSnafu {
            name: self.spec.name.clone(),
        }
    }

    /// Run the build. Returns whether it completed successfully.
    ///
    /// If the build outlives the configured timeout the state is left
    /// `IN_PROGRESS` and `false` is returned.
    pub async fn build_image(&self) -> Result<bool, BuildError> {
        let actual = self.state();
        ensure!(
            actual == BuildState::Initialized,
            IllegalStateSnafu {
                name: self.spec.name.clone(),
                actual
            }
        );
        ensure!(!self.spec.name.is_empty(), MissingFieldSnafu { field: "name" });
        ensure!(
            !self.spec.registry.is_empty(),
            MissingFieldSnafu { field: "registry" }
        );

        let context = resolve(&self.spec, self.in_cluster)?;
        let job = self.job(&context);
        self.claim()?;
        if let Err(e) = self.api.apply_workload(&job).await {
            self.advance(BuildState::Failed);
            return Err(e).context(self.cluster_err());
        }
        tracing::info!(
            build = %self.spec.name,
            "building {} from {}",
            self.image_references()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            context.cluster_path
        );

        let pod = match self.wait_for_pod(&job).await {
            Ok(pod) => pod,
            Err(e) => {
                self.advance(BuildState::Failed);
                return Err(e);
            }
        };
        self.attach_logs(&pod).await;

        let deadline = Instant::now() + self.settings.build_timeout;
        match tokio::time::timeout_at(deadline, self.watch_outcome(deadline)).await {
            Ok(Ok(outcome)) => self.advance(outcome),
            Ok(Err(e)) => {
                self.advance(BuildState::Failed);
                self.stop_logs();
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    build = %self.spec.name,
                    "no outcome within {:?}",
                    self.settings.build_timeout
                );
                self.stop_logs();
            }
        }
        Ok(self.state() == BuildState::Completed)
    }

    /// Remove the build job and its pods.
    pub async fn delete_job(&self) -> Result<(), BuildError> {
        let ns = &self.spec.namespace;
        let exists = self
            .api
            .workload_exists(ns, WorkloadKind::Task, &self.spec.name)
            .await
            .context(self.cluster_err())?;
        if exists {
            self.api
                .delete_workload(ns, WorkloadKind::Task, &self.spec.name)
                .await
                .context(self.cluster_err())?;
        }
        self.stop_logs();
        Ok(())
    }

    fn job(&self, context: &ResolvedContext) -> WorkloadSpec {
        let selector = manifest::selector(&self.spec.name);
        let mut labels = selector.clone();
        labels.insert(
            manifest::MANAGED_BY_LABEL.to_string(),
            env!("CARGO_PKG_NAME").to_string(),
        );

        let (volumes, mounts) = match &context.volume {
            Some(path) => (
                vec![Volume {
                    name: "build-context".to_string(),
                    source: VolumeSource::HostPath { path: path.clone() },
                }],
                vec![MountPoint {
                    volume: "build-context".to_string(),
                    path: path.clone(),
                    sub_path: None,
                    read_only: false,
                }],
            ),
            None => (Vec::new(), Vec::new()),
        };

        WorkloadSpec {
            name: self.spec.name.clone(),
            namespace: self.spec.namespace.clone(),
            kind: WorkloadKind::Task,
            replicas: 1,
            labels: labels.clone(),
            selector,
            template: PodTemplate {
                labels,
                container: ContainerTemplate {
                    name: "builder".to_string(),
                    image: self.spec.builder_image.clone(),
                    command: None,
                    args: self.spec.executor_args(&context.cluster_path),
                    env: Default::default(),
                    ports: Vec::new(),
                    resources: ResourceRequirements::default(),
                    readiness: None,
                    mounts,
                },
                volumes,
                restart: false,
            },
        }
    }

    async fn wait_for_pod(&self, job: &WorkloadSpec) -> Result<PodId, BuildError> {
        let timeout = self.settings.build_pod_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let pods = self
                .api
                .list_pods(&job.namespace, &job.selector)
                .await
                .context(self.cluster_err())?;
            if let Some(pod) = pods.into_iter().next() {
                return Ok(pod.name);
            }
            ensure!(
                Instant::now() < deadline,
                NoBuilderPodSnafu {
                    name: self.spec.name.clone(),
                    timeout
                }
            );
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn attach_logs(&self, pod: &PodId) {
        let sink = self.spec.output.clone().unwrap_or_else(|| {
            let build = self.spec.name.clone();
            OutputSink::new(move |line| {
                if let Some(line) = line {
                    tracing::info!(build = %build, "{}", line);
                }
            })
        });
        match self
            .api
            .pod_logs(&self.spec.namespace, pod.as_str(), "builder")
            .await
        {
            Ok(lines) => *self.pump.lock() = Some(LogPump::spawn(pod.as_str(), lines, sink)),
            Err(e) => tracing::warn!(build = %self.spec.name, "cannot follow builder logs: {}", e),
        }
    }

    fn stop_logs(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.stop();
        }
    }

    /// Watch the job until a terminal condition, re-subscribing when a watch
    /// closes cleanly. An error close counts as failure.
    async fn watch_outcome(&self, deadline: Instant) -> Result<BuildState, BuildError> {
        let (ns, name) = (&self.spec.namespace, &self.spec.name);
        while Instant::now() < deadline {
            let mut events = self.api.watch_job(ns, name).await.context(self.cluster_err())?;
            while let Some(event) = events.next().await {
                match event {
                    WatchEvent::Added(job) | WatchEvent::Modified(job) => {
                        if let Some(outcome) = job_outcome(&job) {
                            return Ok(outcome);
                        }
                    }
                    WatchEvent::Deleted(_) => {
                        tracing::warn!(build = %name, "build job deleted before finishing");
                        return Ok(BuildState::Failed);
                    }
                    WatchEvent::Error(message) => {
                        tracing::warn!(build = %name, "job watch failed: {}", message);
                        return Ok(BuildState::Failed);
                    }
                }
            }
            tracing::debug!(build = %name, "job watch closed, resubscribing");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        std::future::pending().await
    }
}

fn job_outcome(job: &JobStatus) -> Option<BuildState> {
    if job.is_complete() {
        return Some(BuildState::Completed);
    }
    job.failure().map(|condition| {
        tracing::warn!(
            job = %job.name,
            "build failed: {}",
            condition
                .message
                .as_deref()
                .or(condition.reason.as_deref())
                .unwrap_or("no reason given")
        );
        BuildState::Failed
    })
}
