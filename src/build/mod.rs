// ABOUTME: Container image builds run as one-shot cluster tasks.
// ABOUTME: The builder pod reads the context from a shared host directory and pushes to a registry.

mod builder;
mod context;
mod error;
mod spec;

pub use builder::ImageBuilder;
pub use context::{ResolvedContext, resolve as resolve_context, to_posix_path};
pub use error::{BuildError, BuildErrorKind};
pub use spec::{BuildSpec, BuildState, DEFAULT_BUILDER_IMAGE, SharedContext};
