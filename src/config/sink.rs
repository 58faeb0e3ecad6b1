// ABOUTME: Output callback that receives container output one line at a time.
// ABOUTME: A None line marks the end of the stream.

use std::fmt;
use std::sync::Arc;

/// Consumer of container output.
///
/// Called from a dedicated log pump task; it must not block for long or the
/// pump stalls.
#[derive(Clone)]
pub struct OutputSink(Arc<dyn Fn(Option<&str>) + Send + Sync>);

impl OutputSink {
    pub fn new(f: impl Fn(Option<&str>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn line(&self, line: &str) {
        (self.0)(Some(line))
    }

    pub fn end(&self) {
        (self.0)(None)
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink(..)")
    }
}
