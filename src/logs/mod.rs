// ABOUTME: Streams container output to the spec's output callback.
// ABOUTME: One pump task per stream, stoppable from any thread.

mod lines;
mod pump;

pub use lines::{LineSplitter, split_lines};
pub use pump::LogPump;

use futures::stream::BoxStream;

/// A stream of output lines from a backend.
pub type LineStream = BoxStream<'static, Result<String, LogError>>;

/// Errors from log streams.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("stream error: {0}")]
    Stream(String),
}
