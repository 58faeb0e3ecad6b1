// ABOUTME: The Container facade: one handle over whichever runtime the spec selects.
// ABOUTME: Owns the lifecycle state, guards every operation, arms lifetime and shutdown cleanup.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{Backend, ContainerSpec};
use crate::error::Result;
use crate::runtime::{
    Backends, Cleanup, ContainerRuntime, ExecOutput, ExecRequest, HookHandle, Terminator,
};
use crate::state::{LifecycleState, StateMachine};

use LifecycleState::*;

/// Handle to one container. Clones share the same container.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    spec: Arc<ContainerSpec>,
    state: Arc<StateMachine>,
    runtime: Arc<dyn ContainerRuntime>,
    terminator: Mutex<Option<Terminator>>,
    hook: Mutex<Option<HookHandle>>,
    /// `start` handed the instance to the backend.
    started: AtomicBool,
    /// Backend resources are gone. FAILED never becomes DELETED, so the
    /// state alone cannot say this.
    removed: AtomicBool,
    /// Serializes deletes from the caller, the terminator and the shutdown hooks.
    deleting: AsyncMutex<()>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.inner.spec.name)
            .field("backend", &self.inner.runtime.backend())
            .field("state", &self.inner.state.state())
            .finish()
    }
}

impl Container {
    /// Build the runtime for `spec`. Ephemeral specs are registered with the
    /// shutdown hooks of `backends`.
    pub fn new(spec: ContainerSpec, backends: &Backends) -> Result<Self> {
        let spec = Arc::new(spec);
        let state = Arc::new(StateMachine::new(spec.name.clone()));
        let runtime = backends.runtime_for(spec.clone(), state.clone())?;
        let inner = Arc::new(Inner {
            spec,
            state,
            runtime,
            terminator: Mutex::new(None),
            hook: Mutex::new(None),
            started: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            deleting: AsyncMutex::new(()),
        });
        if inner.spec.ephemeral {
            let weak: Weak<dyn Cleanup> = Arc::downgrade(&inner) as Weak<dyn Cleanup>;
            *inner.hook.lock() = Some(backends.hooks().register(weak));
        }
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.inner.spec
    }

    pub fn backend(&self) -> Backend {
        self.inner.runtime.backend()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.state()
    }

    /// Provision and launch. Only valid once, from UNINITIATED.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner.state.change(Initializing, &[Uninitiated])?;
        let started = inner.runtime.start().await;
        inner.started.store(true, Ordering::Release);
        if let Err(e) = started {
            inner.state.try_change(Failed);
            return Err(e);
        }
        if let Some(lifetime) = inner.spec.max_lifetime {
            let weak: Weak<dyn Cleanup> = Arc::downgrade(inner) as Weak<dyn Cleanup>;
            *inner.terminator.lock() = Some(Terminator::arm(weak, lifetime));
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.disarm();
        self.inner.stop().await
    }

    pub async fn kill(&self) -> Result<()> {
        self.disarm();
        self.inner.kill().await
    }

    /// Release every backend resource. A no-op once deleted.
    ///
    /// A forced delete also accepts a started instance that is still
    /// INITIALIZING; it is marked FAILED first.
    pub async fn delete(&self, force: bool) -> Result<()> {
        self.disarm();
        self.inner.delete(force).await
    }

    pub async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        self.inner.state.require(&[Running, Unknown])?;
        self.inner.runtime.execute(request).await
    }

    pub async fn put_file(&self, local: &Path, remote_dir: &str, name: &str) -> Result<()> {
        self.require_instance()?;
        self.inner.runtime.put_file(local, remote_dir, name).await
    }

    pub async fn get_file(&self, remote_dir: &str, name: &str, dest: Option<&Path>) -> Result<PathBuf> {
        self.require_instance()?;
        self.inner.runtime.get_file(remote_dir, name, dest).await
    }

    pub async fn put_directory(&self, local: &Path, remote_dir: &str) -> Result<()> {
        self.require_instance()?;
        self.inner.runtime.put_directory(local, remote_dir).await
    }

    pub async fn get_directory(&self, remote_dir: &str, dest: Option<&Path>) -> Result<Vec<PathBuf>> {
        self.require_instance()?;
        self.inner.runtime.get_directory(remote_dir, dest).await
    }

    /// Wait until `state` has been reached. `None` or zero waits indefinitely.
    pub async fn wait_for_state(&self, state: LifecycleState, timeout: Option<Duration>) -> bool {
        self.inner.state.wait_for_state(state, timeout).await
    }

    /// Wait until STOPPED, DELETED or FAILED. `None` or zero waits indefinitely.
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        self.inner.state.wait_for_completion(timeout).await
    }

    pub fn host(&self) -> Option<String> {
        self.inner.runtime.host()
    }

    pub fn ip_address(&self) -> Option<String> {
        self.inner.runtime.ip_address()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.inner.runtime.duration()
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.inner.runtime.exit_code()
    }

    /// Externally reachable port for a container port.
    pub fn mapped_port(&self, port: u16) -> Option<u16> {
        self.inner.spec.mapped_port(port)
    }

    fn require_instance(&self) -> Result<LifecycleState> {
        self.inner
            .state
            .require(&[Running, Terminating, Stopped, Failed, Unknown])
    }

    fn disarm(&self) {
        if let Some(terminator) = self.inner.terminator.lock().take() {
            terminator.cancel();
        }
    }
}

impl Inner {
    async fn stop(&self) -> Result<()> {
        self.state.change(Terminating, &[Running, Unknown])?;
        self.runtime.stop().await?;
        self.state.try_change(Stopped);
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        self.state
            .change(Terminating, &[Running, Terminating, Unknown])?;
        self.runtime.kill().await?;
        self.state.try_change(Stopped);
        Ok(())
    }

    /// Mark a started instance whose workload never came up as FAILED.
    /// Returns whether it was in that position.
    fn abandon_start(&self) -> bool {
        self.started.load(Ordering::Acquire) && self.state.change(Failed, &[Initializing]).is_ok()
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire) || self.state.state() == Deleted
    }

    async fn delete(&self, force: bool) -> Result<()> {
        let _deleting = self.deleting.lock().await;
        if self.is_removed() {
            tracing::debug!(container = %self.spec.name, "already deleted");
            return Ok(());
        }
        let before = if force && self.abandon_start() {
            tracing::warn!(container = %self.spec.name, "deleting before it came up");
            Failed
        } else {
            self.state
                .require(&[Running, Terminating, Stopped, Failed, Unknown])?
        };
        self.runtime.delete(force).await?;
        self.removed.store(true, Ordering::Release);
        if before == Running {
            self.state.try_change(Terminating);
        }
        // FAILED is final; the resources are gone but the state stays.
        self.state.try_change(Deleted);
        self.hook.lock().take();
        Ok(())
    }
}

#[async_trait]
impl Cleanup for Inner {
    fn describe(&self) -> String {
        self.spec.name.clone()
    }

    fn is_deleted(&self) -> bool {
        self.is_removed()
    }

    async fn stop(&self) -> Result<()> {
        if self.abandon_start() {
            return self.runtime.stop().await;
        }
        Inner::stop(self).await
    }

    async fn kill(&self) -> Result<()> {
        if self.abandon_start() {
            return self.runtime.kill().await;
        }
        Inner::kill(self).await
    }

    async fn delete(&self) -> Result<()> {
        Inner::delete(self, true).await
    }
}
