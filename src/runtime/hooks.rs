// ABOUTME: Process-shutdown cleanup of ephemeral containers.
// ABOUTME: A registry the caller owns; entries hold weak handles and vanish on delete.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

use crate::error::Result;

/// Something the shutdown hooks and the lifetime terminator can tear down.
#[async_trait]
pub trait Cleanup: Send + Sync {
    fn describe(&self) -> String;

    fn is_deleted(&self) -> bool;

    async fn stop(&self) -> Result<()>;

    async fn kill(&self) -> Result<()>;

    /// Forced delete.
    async fn delete(&self) -> Result<()>;
}

#[derive(Default)]
struct Registry {
    next: AtomicU64,
    entries: Mutex<BTreeMap<u64, Weak<dyn Cleanup>>>,
}

/// Shutdown cleanup registry. Clones share the same entries.
#[derive(Clone, Default)]
pub struct ShutdownHooks {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("registered", &self.len())
            .finish()
    }
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, target: Weak<dyn Cleanup>) -> HookHandle {
        let id = self.registry.next.fetch_add(1, Ordering::Relaxed);
        self.registry.entries.lock().insert(id, target);
        HookHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop, kill if stop fails, then delete every registered target that
    /// still exists. Failures are logged and never stop the others.
    pub async fn run_all(&self) {
        let targets: Vec<Arc<dyn Cleanup>> = self
            .registry
            .entries
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        if targets.is_empty() {
            return;
        }
        tracing::info!("shutdown: cleaning up {} ephemeral container(s)", targets.len());
        futures::future::join_all(targets.iter().map(|t| teardown(t.as_ref()))).await;
    }

    /// Run every hook once SIGINT or SIGTERM arrives.
    pub fn listen(&self) -> JoinHandle<()> {
        let hooks = self.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            hooks.run_all().await;
        })
    }
}

async fn teardown(target: &dyn Cleanup) {
    if target.is_deleted() {
        return;
    }
    let name = target.describe();
    if let Err(e) = target.stop().await {
        tracing::warn!(container = %name, "shutdown stop failed, killing: {}", e);
        if let Err(e) = target.kill().await {
            tracing::error!(container = %name, "shutdown kill failed: {}", e);
        }
    }
    if let Err(e) = target.delete().await {
        tracing::error!(container = %name, "shutdown delete failed: {}", e);
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!("cannot listen for SIGTERM: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {}", e);
    }
}

/// Deregisters its entry when removed or dropped.
#[derive(Debug)]
pub struct HookHandle {
    id: u64,
    registry: Weak<Registry>,
}

impl HookHandle {
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.entries.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct Recorder {
        fail_stop: bool,
        deleted: AtomicBool,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Cleanup for Recorder {
        fn describe(&self) -> String {
            "recorder".into()
        }
        fn is_deleted(&self) -> bool {
            self.deleted.load(Ordering::SeqCst)
        }
        async fn stop(&self) -> Result<()> {
            self.calls.lock().push("stop");
            if self.fail_stop {
                return Err(Error::Exec("stop refused".into()));
            }
            Ok(())
        }
        async fn kill(&self) -> Result<()> {
            self.calls.lock().push("kill");
            Ok(())
        }
        async fn delete(&self) -> Result<()> {
            self.calls.lock().push("delete");
            self.deleted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_failure_falls_back_to_kill() {
        let hooks = ShutdownHooks::new();
        let recorder = Arc::new(Recorder {
            fail_stop: true,
            ..Default::default()
        });
        let weak: Weak<dyn Cleanup> = Arc::downgrade(&recorder) as Weak<dyn Cleanup>;
        let _handle = hooks.register(weak);
        hooks.run_all().await;
        assert_eq!(*recorder.calls.lock(), vec!["stop", "kill", "delete"]);
    }

    #[tokio::test]
    async fn deleted_targets_are_skipped() {
        let hooks = ShutdownHooks::new();
        let recorder = Arc::new(Recorder::default());
        recorder.deleted.store(true, Ordering::SeqCst);
        let _handle = hooks.register(Arc::downgrade(&recorder) as Weak<dyn Cleanup>);
        hooks.run_all().await;
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn dropping_handle_deregisters() {
        let hooks = ShutdownHooks::new();
        let recorder = Arc::new(Recorder::default());
        let handle = hooks.register(Arc::downgrade(&recorder) as Weak<dyn Cleanup>);
        assert_eq!(hooks.len(), 1);
        handle.remove();
        assert!(hooks.is_empty());
    }
}
