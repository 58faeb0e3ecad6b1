// ABOUTME: The local engine backend: one container per workload.
// ABOUTME: Speaks the Docker-compatible API to Docker or Podman.

mod bollard;
mod detection;
mod engine;
mod runtime;

pub use bollard::BollardEngine;
pub use detection::{DetectionError, EngineEndpoint, EngineKind, detect_local};
pub use engine::{ContainerStatus, CreateRequest, EngineApi, EngineError, PortPublish};
pub use runtime::LocalRuntime;

pub(crate) use runtime::destination;
