// ABOUTME: Maximum-lifetime enforcement for started containers.
// ABOUTME: A one-shot timer task that kills then deletes its target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::hooks::Cleanup;

/// Armed lifetime timer. Cancelling or dropping it only has an effect while
/// it is still sleeping; once it fires, its kill and delete run to the end.
#[derive(Debug)]
pub struct Terminator {
    task: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

impl Terminator {
    /// After `after`, kill the target and then always attempt a forced delete.
    pub fn arm(target: Weak<dyn Cleanup>, after: Duration) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            flag.store(true, Ordering::Release);
            let Some(target) = target.upgrade() else {
                return;
            };
            if target.is_deleted() {
                return;
            }
            let name = target.describe();
            tracing::info!(container = %name, "max lifetime of {:?} reached", after);
            if let Err(e) = target.kill().await {
                tracing::warn!(container = %name, "lifetime kill failed: {}", e);
            }
            if let Err(e) = target.delete().await {
                tracing::error!(container = %name, "lifetime delete failed: {}", e);
            }
        });
        Self { task, fired }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Terminator {
    fn drop(&mut self) {
        // The flag is set before the first await after the sleep, so a
        // fired task is never interrupted mid-cleanup.
        if !self.has_fired() {
            self.task.abort();
        }
    }
}
