// ABOUTME: Reassembles arbitrary byte chunks into text lines.
// ABOUTME: Engines deliver log frames that split or join lines freely.

use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

use super::{LineStream, LogError};

/// Accumulates bytes and yields complete lines without their terminators.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// The trailing partial line, if any.
    pub fn finish(mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

/// Turn a stream of byte chunks into a stream of lines.
///
/// A chunk error is yielded once and ends the stream.
pub fn split_lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    struct State<S> {
        chunks: std::pin::Pin<Box<S>>,
        splitter: LineSplitter,
        ready: VecDeque<String>,
        done: bool,
    }

    let state = State {
        chunks: Box::pin(chunks),
        splitter: LineSplitter::default(),
        ready: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(bytes)) => {
                    let lines = state.splitter.push(bytes.as_ref());
                    state.ready.extend(lines);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(LogError::Stream(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    let rest = std::mem::take(&mut state.splitter).finish();
                    state.ready.extend(rest);
                }
            }
        }
    })
    .boxed()
}
