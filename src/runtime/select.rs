// ABOUTME: Composition root for runtimes: engine and cluster clients, settings, hooks.
// ABOUTME: Picks the runtime for a spec from its backend and execution mode.

use std::sync::{Arc, OnceLock};

use super::cluster::{ClusterApi, ClusterRuntime, WorkloadKind};
use super::hooks::ShutdownHooks;
use super::local::{BollardEngine, EngineApi, LocalRuntime};
use super::traits::ContainerRuntime;
use crate::config::{Backend, ContainerSpec, ExecutionMode, Settings};
use crate::environment::running_in_cluster;
use crate::error::{Error, Result};
use crate::state::StateMachine;

/// Clients and settings shared by every container built from it.
///
/// The local engine client is created on first use when none was supplied.
/// Cluster containers need a client supplied with [`Backends::with_cluster`].
#[derive(Clone)]
pub struct Backends {
    engine: Arc<OnceLock<Arc<dyn EngineApi>>>,
    cluster: Option<Arc<dyn ClusterApi>>,
    in_cluster: bool,
    settings: Settings,
    hooks: ShutdownHooks,
}

impl Default for Backends {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("engine", &self.engine.get().is_some())
            .field("cluster", &self.cluster.is_some())
            .field("in_cluster", &self.in_cluster)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Backends {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(OnceLock::new()),
            cluster: None,
            in_cluster: running_in_cluster(),
            settings: Settings::default(),
            hooks: ShutdownHooks::new(),
        }
    }

    pub fn with_engine(self, engine: Arc<dyn EngineApi>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(engine);
        Self {
            engine: Arc::new(cell),
            ..self
        }
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterApi>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_hooks(mut self, hooks: ShutdownHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Override in-cluster detection.
    pub fn in_cluster(mut self, in_cluster: bool) -> Self {
        self.in_cluster = in_cluster;
        self
    }

    pub fn is_in_cluster(&self) -> bool {
        self.in_cluster
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn hooks(&self) -> &ShutdownHooks {
        &self.hooks
    }

    pub fn cluster(&self) -> Result<Arc<dyn ClusterApi>> {
        self.cluster.clone().ok_or_else(|| {
            Error::Config("cluster backend selected but no cluster client is configured".into())
        })
    }

    /// The local engine client, connecting to the detected socket on first use.
    pub fn engine(&self) -> Result<Arc<dyn EngineApi>> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }
        let connected: Arc<dyn EngineApi> = Arc::new(BollardEngine::connect_local()?);
        Ok(self.engine.get_or_init(|| connected).clone())
    }

    pub(crate) fn runtime_for(
        &self,
        spec: Arc<ContainerSpec>,
        state: Arc<StateMachine>,
    ) -> Result<Arc<dyn ContainerRuntime>> {
        match spec.backend {
            Backend::Local => Ok(Arc::new(LocalRuntime::new(
                spec,
                state,
                self.engine()?,
                self.settings.clone(),
            ))),
            Backend::Cluster => {
                let kind = match spec.mode {
                    ExecutionMode::Continuous => WorkloadKind::Service,
                    ExecutionMode::RunToCompletion => WorkloadKind::Task,
                };
                Ok(Arc::new(ClusterRuntime::new(
                    spec,
                    state,
                    self.cluster()?,
                    kind,
                    self.in_cluster,
                    self.settings.clone(),
                )))
            }
        }
    }
}
