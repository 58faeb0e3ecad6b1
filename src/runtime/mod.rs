// ABOUTME: Runtime backends behind one contract, plus their shared machinery.
// ABOUTME: Local engine, cluster orchestrator, lifetime timer and shutdown hooks.

pub mod cluster;
mod hooks;
mod lifetime;
pub mod local;
mod select;
mod traits;
mod types;

pub use hooks::{Cleanup, HookHandle, ShutdownHooks};
pub use lifetime::Terminator;
pub use select::Backends;
pub use traits::{ContainerRuntime, ExecOutput, ExecRequest};
