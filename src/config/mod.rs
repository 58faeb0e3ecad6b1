// ABOUTME: The immutable container spec consumed by every runtime.
// ABOUTME: Built with ContainerSpecBuilder or loaded from a YAML spec file.

mod builder;
mod env_value;
mod mounts;
mod settings;
mod sink;

pub use builder::ContainerSpecBuilder;
pub use env_value::{EnvValue, resolve_env_map};
pub use mounts::{FileMount, FileSource, VolumeMount};
pub use settings::Settings;
pub use sink::OutputSink;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::types::ImageRef;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Whether the workload keeps running or runs once to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Continuous,
    RunToCompletion,
}

/// Which backend runs the workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Cluster,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Local => f.write_str("local"),
            Backend::Cluster => f.write_str("cluster"),
        }
    }
}

/// CPU in cores, memory in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu_request: Option<f64>,
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub memory_request: Option<u64>,
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

/// Desired state of one workload. Immutable once built.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub env: HashMap<String, String>,
    pub command: Option<Vec<String>>,
    pub args: Vec<String>,
    pub image: ImageRef,
    /// Logical port name to container port.
    pub exposed_ports: BTreeMap<String, u16>,
    /// Container port to externally reachable port. Keys are always exposed ports.
    pub port_mappings: BTreeMap<u16, u16>,
    pub files: BTreeMap<String, FileMount>,
    pub volumes: Vec<VolumeMount>,
    pub resources: Resources,
    pub network: Option<String>,
    pub ephemeral: bool,
    pub max_lifetime: Option<Duration>,
    pub output: Option<OutputSink>,
    pub mode: ExecutionMode,
    pub backend: Backend,
}

impl ContainerSpec {
    pub fn builder(name: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder::new(name)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SpecFile = serde_yaml::from_str(yaml)?;
        file.into_builder()?.build()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The first exposed port, used for probes and default exposure.
    pub fn primary_port(&self) -> Option<u16> {
        self.exposed_ports.values().next().copied()
    }

    /// Externally reachable port for a container port, if mapped.
    pub fn mapped_port(&self, port: u16) -> Option<u16> {
        self.port_mappings.get(&port).copied()
    }
}

/// On-disk shape of a spec file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    env: HashMap<String, EnvValue>,
    #[serde(default)]
    command: Option<Vec<String>>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    ports: BTreeMap<String, u16>,
    #[serde(default)]
    port_mappings: BTreeMap<u16, u16>,
    #[serde(default)]
    files: BTreeMap<String, FileMount>,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    resources: Resources,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    ephemeral: bool,
    #[serde(default, with = "humantime_serde")]
    max_lifetime: Option<Duration>,
    #[serde(default)]
    mode: ExecutionMode,
    #[serde(default)]
    backend: Backend,
}

impl SpecFile {
    fn into_builder(self) -> Result<ContainerSpecBuilder> {
        let mut builder = ContainerSpecBuilder::new(self.name)
            .labels(self.labels)
            .envs(resolve_env_map(&self.env)?)
            .args(self.args)
            .resources(self.resources)
            .ephemeral(self.ephemeral)
            .mode(self.mode)
            .backend(self.backend);

        if let Some(namespace) = self.namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(image) = self.image {
            builder = builder.image(image);
        }
        if let Some(command) = self.command {
            builder = builder.command(command);
        }
        for (name, port) in self.ports {
            builder = builder.expose(name, port);
        }
        for (internal, external) in self.port_mappings {
            builder = builder.map_port(internal, external);
        }
        for (name, mount) in self.files {
            builder = builder.file(name, mount);
        }
        for volume in &self.volumes {
            builder = builder.volume(VolumeMount::parse(volume)?);
        }
        if let Some(network) = self.network {
            builder = builder.network(network);
        }
        if let Some(lifetime) = self.max_lifetime {
            builder = builder.max_lifetime(lifetime);
        }
        Ok(builder)
    }
}
