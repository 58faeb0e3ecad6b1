// ABOUTME: The backend-neutral runtime contract shared by local and cluster backends.
// ABOUTME: ContainerRuntime is sealed; only this crate's runtimes implement it.

mod container;
mod exec;
pub(crate) mod sealed;

pub use container::ContainerRuntime;
pub use exec::{ExecOutput, ExecRequest};
