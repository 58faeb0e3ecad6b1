// ABOUTME: What to build and where to push it, plus the build's lifecycle state.
// ABOUTME: BuildState only moves forward: INITIALIZED, IN_PROGRESS, then COMPLETED or FAILED.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::OutputSink;
use crate::error::Result;
use crate::types::ImageRef;

pub const DEFAULT_BUILDER_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    Initialized,
    InProgress,
    Completed,
    Failed,
}

impl BuildState {
    pub fn can_transition_to(self, next: BuildState) -> bool {
        use BuildState::*;
        matches!(
            (self, next),
            (Initialized, InProgress) | (InProgress, Completed) | (InProgress, Failed)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, BuildState::Completed | BuildState::Failed)
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildState::Initialized => "INITIALIZED",
            BuildState::InProgress => "IN_PROGRESS",
            BuildState::Completed => "COMPLETED",
            BuildState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A host directory the cluster nodes also see, under a different path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SharedContext {
    pub host_dir: PathBuf,
    pub cluster_dir: String,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_tags() -> NonEmpty<String> {
    NonEmpty::new("latest".to_string())
}

fn default_verbosity() -> String {
    "info".to_string()
}

fn default_builder_image() -> String {
    DEFAULT_BUILDER_IMAGE.to_string()
}

fn default_namespace() -> String {
    crate::config::DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    /// Also the name of the build job.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub context_dir: PathBuf,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_tags")]
    pub tags: NonEmpty<String>,
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
    #[serde(default = "default_builder_image")]
    pub builder_image: String,
    #[serde(default)]
    pub shared_context: Option<SharedContext>,
    #[serde(skip)]
    pub output: Option<OutputSink>,
}

impl BuildSpec {
    pub fn new(name: impl Into<String>, context_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            context_dir: context_dir.into(),
            dockerfile: default_dockerfile(),
            registry: String::new(),
            repository: String::new(),
            tags: default_tags(),
            verbosity: default_verbosity(),
            builder_image: default_builder_image(),
            shared_context: None,
            output: None,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    pub fn destination(mut self, registry: impl Into<String>, repository: impl Into<String>) -> Self {
        self.registry = registry.into();
        self.repository = repository.into();
        self
    }

    pub fn tags(mut self, tags: NonEmpty<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn verbosity(mut self, verbosity: impl Into<String>) -> Self {
        self.verbosity = verbosity.into();
        self
    }

    pub fn builder_image(mut self, image: impl Into<String>) -> Self {
        self.builder_image = image.into();
        self
    }

    pub fn shared_context(mut self, host_dir: impl Into<PathBuf>, cluster_dir: impl Into<String>) -> Self {
        self.shared_context = Some(SharedContext {
            host_dir: host_dir.into(),
            cluster_dir: cluster_dir.into(),
        });
        self
    }

    pub fn on_output(mut self, sink: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        self.output = Some(OutputSink::new(sink));
        self
    }

    /// One push destination per tag. The repository defaults to the build name.
    pub fn image_references(&self) -> Vec<ImageRef> {
        let repository = if self.repository.is_empty() {
            &self.name
        } else {
            &self.repository
        };
        self.tags
            .iter()
            .map(|tag| ImageRef::destination(&self.registry, repository, tag))
            .collect()
    }

    /// Arguments for the builder container, given the context path it sees.
    pub fn executor_args(&self, context: &str) -> Vec<String> {
        let mut args = vec![
            format!("--dockerfile={}", self.dockerfile),
            format!("--context=dir://{}", context),
            format!("--verbosity={}", self.verbosity),
        ];
        args.extend(
            self.image_references()
                .iter()
                .map(|image| format!("--destination={}", image)),
        );
        args
    }
}
