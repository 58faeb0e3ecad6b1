// ABOUTME: Background task that pumps log lines into an OutputSink.
// ABOUTME: stop() flips the continue flag and wakes a read blocked on the stream.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::LineStream;
use crate::config::OutputSink;

/// A running log pump. Dropping it does not stop the task; call `stop()`.
#[derive(Debug)]
pub struct LogPump {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogPump {
    /// Spawn a task feeding every line of `lines` to `sink`, then `None` at the end.
    pub fn spawn(source: impl Into<String>, mut lines: LineStream, sink: OutputSink) -> Self {
        let source = source.into();
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());

        let task = tokio::spawn({
            let running = running.clone();
            let wake = wake.clone();
            async move {
                while running.load(Ordering::Acquire) {
                    tokio::select! {
                        _ = wake.notified() => break,
                        next = lines.next() => match next {
                            Some(Ok(line)) => sink.line(&line),
                            Some(Err(e)) => {
                                tracing::warn!(source = %source, "log stream ended with error: {}", e);
                                break;
                            }
                            None => break,
                        },
                    }
                }
                running.store(false, Ordering::Release);
                sink.end();
                tracing::debug!(source = %source, "log pump finished");
            }
        });

        Self {
            running,
            wake,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the pump to stop. Safe to call repeatedly.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// Wait for the pump task to finish.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type LineResult = Result<String, crate::logs::LogError>;

    fn collecting_sink() -> (OutputSink, Arc<Mutex<Vec<Option<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            OutputSink::new(move |line| seen.lock().push(line.map(str::to_string)))
        };
        (sink, seen)
    }

    #[tokio::test]
    async fn pumps_all_lines_then_end_marker() {
        let (sink, seen) = collecting_sink();
        let lines = stream::iter(vec![Ok("a".to_string()), Ok("b".to_string())]).boxed();
        let pump = LogPump::spawn("test", lines, sink);
        pump.join().await;

        assert_eq!(
            *seen.lock(),
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
        assert!(!pump.is_running());
    }

    #[tokio::test]
    async fn stop_wakes_a_blocked_read() {
        let (sink, seen) = collecting_sink();
        let pump = LogPump::spawn("test", stream::pending::<LineResult>().boxed(), sink);
        assert!(pump.is_running());

        pump.stop();
        pump.join().await;

        assert_eq!(*seen.lock(), vec![None]);
    }
}
