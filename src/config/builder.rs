// ABOUTME: Fluent builder for ContainerSpec.
// ABOUTME: All invariants are checked once in build(), before any backend call.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{
    Backend, ContainerSpec, DEFAULT_NAMESPACE, ExecutionMode, FileMount, OutputSink, Resources,
    VolumeMount,
};
use crate::error::{Error, Result};
use crate::types::ImageRef;

#[derive(Debug, Clone)]
#[must_use = "call build() to obtain a ContainerSpec"]
pub struct ContainerSpecBuilder {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    env: HashMap<String, String>,
    command: Option<Vec<String>>,
    args: Vec<String>,
    image: Option<String>,
    exposed_ports: BTreeMap<String, u16>,
    port_mappings: BTreeMap<u16, u16>,
    files: BTreeMap<String, FileMount>,
    volumes: Vec<VolumeMount>,
    resources: Resources,
    network: Option<String>,
    ephemeral: bool,
    max_lifetime: Option<Duration>,
    output: Option<OutputSink>,
    mode: ExecutionMode,
    backend: Backend,
}

impl ContainerSpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            labels: BTreeMap::new(),
            env: HashMap::new(),
            command: None,
            args: Vec::new(),
            image: None,
            exposed_ports: BTreeMap::new(),
            port_mappings: BTreeMap::new(),
            files: BTreeMap::new(),
            volumes: Vec::new(),
            resources: Resources::default(),
            network: None,
            ephemeral: false,
            max_lifetime: None,
            output: None,
            mode: ExecutionMode::default(),
            backend: Backend::default(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Expose a container port under a logical name.
    pub fn expose(mut self, name: impl Into<String>, port: u16) -> Self {
        self.exposed_ports.insert(name.into(), port);
        self
    }

    /// Make an exposed container port reachable on `external`.
    pub fn map_port(mut self, internal: u16, external: u16) -> Self {
        self.port_mappings.insert(internal, external);
        self
    }

    pub fn file(mut self, name: impl Into<String>, mount: FileMount) -> Self {
        self.files.insert(name.into(), mount);
        self
    }

    pub fn volume(mut self, volume: VolumeMount) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Ephemeral containers are cleaned up when the process shuts down.
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn on_output(mut self, sink: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.output = Some(OutputSink::new(sink));
        self
    }

    pub fn output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn build(self) -> Result<ContainerSpec> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("container name is required".to_string()));
        }
        let image = self
            .image
            .as_deref()
            .ok_or_else(|| Error::Config(format!("{}: image is required", self.name)))?;
        let image = ImageRef::parse(image)
            .map_err(|e| Error::Config(format!("{}: {}", self.name, e)))?;

        for internal in self.port_mappings.keys() {
            if !self.exposed_ports.values().any(|p| p == internal) {
                return Err(Error::Config(format!(
                    "{}: port {} is mapped but not exposed",
                    self.name, internal
                )));
            }
        }
        for (name, mount) in &self.files {
            if !mount.path.starts_with('/') || mount.path.ends_with('/') {
                return Err(Error::Config(format!(
                    "{}: file mount {} needs an absolute file path, got {}",
                    self.name, name, mount.path
                )));
            }
        }
        if self.max_lifetime.is_some_and(|d| d.is_zero()) {
            return Err(Error::Config(format!(
                "{}: max lifetime must be positive",
                self.name
            )));
        }

        Ok(ContainerSpec {
            name: self.name,
            namespace: self.namespace,
            labels: self.labels,
            env: self.env,
            command: self.command,
            args: self.args,
            image,
            exposed_ports: self.exposed_ports,
            port_mappings: self.port_mappings,
            files: self.files,
            volumes: self.volumes,
            resources: self.resources,
            network: self.network,
            ephemeral: self.ephemeral,
            max_lifetime: self.max_lifetime,
            output: self.output,
            mode: self.mode,
            backend: self.backend,
        })
    }
}
