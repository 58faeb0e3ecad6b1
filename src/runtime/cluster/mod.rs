// ABOUTME: The cluster orchestrator backend: services, tasks, exposures, config maps.
// ABOUTME: Talks to the cluster through the ClusterApi trait.

mod api;
pub mod exposure;
pub mod manifest;
pub mod resources;
mod runtime;
mod watch;

pub use api::{ClusterApi, ClusterError, WatchEvent, WatchStream};
pub use resources::WorkloadKind;
pub use runtime::ClusterRuntime;
pub use watch::lifecycle_state;
