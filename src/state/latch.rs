// ABOUTME: One-shot latch that async waiters can block on with a timeout.
// ABOUTME: Once released it stays released; later waiters return immediately.

use std::time::Duration;
use tokio::sync::watch;

/// A one-shot signal.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Release the latch. Returns `true` only for the call that released it.
    pub fn release(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until released. `None` or a zero timeout waits indefinitely.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.tx.subscribe();
        let released = async move { rx.wait_for(|released| *released).await.is_ok() };
        match timeout.filter(|t| !t.is_zero()) {
            None => released.await,
            Some(limit) => tokio::time::timeout(limit, released)
                .await
                .unwrap_or(false),
        }
    }
}
