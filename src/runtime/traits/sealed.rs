// ABOUTME: Sealed marker for the runtime contract.
// ABOUTME: Keeps ContainerRuntime implementable only inside the crate.

/// Marker implemented by the crate's own runtimes.
pub trait Sealed {}
