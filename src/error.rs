// ABOUTME: Crate-wide error type for berth.
// ABOUTME: Every failure surfaced to callers is wrapped here with its original cause.

use std::path::PathBuf;
use thiserror::Error;

use crate::build::BuildError;
use crate::runtime::cluster::ClusterError;
use crate::runtime::local::EngineError;
use crate::state::LifecycleState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("container is {actual}, operation requires one of [{}]", format_states(.required))]
    IllegalState {
        actual: LifecycleState,
        required: Vec<LifecycleState>,
    },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("file transfer failed: {0}")]
    Transfer(String),

    #[error("image build failed: {0}")]
    Build(#[from] BuildError),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this error is a local contract violation rather than a backend failure.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Error::IllegalState { .. })
    }
}

fn format_states(states: &[LifecycleState]) -> String {
    states
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_state_names_actual_and_required() {
        let err = Error::IllegalState {
            actual: LifecycleState::Stopped,
            required: vec![LifecycleState::Running, LifecycleState::Unknown],
        };
        assert_eq!(
            err.to_string(),
            "container is STOPPED, operation requires one of [RUNNING, UNKNOWN]"
        );
        assert!(err.is_illegal_state());
    }
}
