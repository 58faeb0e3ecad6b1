// ABOUTME: Image build errors with SNAFU context selectors.
// ABOUTME: kind() gives callers a flat enum to match on.

use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

use super::spec::BuildState;
use crate::runtime::cluster::ClusterError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BuildError {
    #[snafu(display("build {name} is {actual}; only an INITIALIZED build can run"))]
    IllegalState { name: String, actual: BuildState },

    #[snafu(display("build spec is missing {field}"))]
    MissingField { field: &'static str },

    #[snafu(display("build context {} does not exist", path.display()))]
    ContextNotFound { path: PathBuf },

    #[snafu(display("copying build context to {}: {source}", dest.display()))]
    ContextCopy {
        dest: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cluster call failed during build {name}: {source}"))]
    Cluster { name: String, source: ClusterError },

    #[snafu(display("no builder pod for {name} appeared within {timeout:?}"))]
    NoBuilderPod { name: String, timeout: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    IllegalState,
    InvalidSpec,
    Context,
    Cluster,
    Timeout,
}

impl BuildError {
    pub fn kind(&self) -> BuildErrorKind {
        match self {
            BuildError::IllegalState { .. } => BuildErrorKind::IllegalState,
            BuildError::MissingField { .. } => BuildErrorKind::InvalidSpec,
            BuildError::ContextNotFound { .. } | BuildError::ContextCopy { .. } => {
                BuildErrorKind::Context
            }
            BuildError::Cluster { .. } => BuildErrorKind::Cluster,
            BuildError::NoBuilderPod { .. } => BuildErrorKind::Timeout,
        }
    }
}
