// ABOUTME: Library root for berth - one lifecycle API over a local engine and a cluster.
// ABOUTME: The CLI binary is in main.rs.

pub mod archive;
pub mod build;
pub mod config;
pub mod container;
pub mod environment;
pub mod error;
pub mod logs;
pub mod runtime;
pub mod state;
pub mod types;

pub use config::{Backend, ContainerSpec, ContainerSpecBuilder, ExecutionMode, OutputSink};
pub use container::Container;
pub use error::{Error, Result};
pub use runtime::{Backends, ExecOutput, ExecRequest};
pub use state::LifecycleState;
