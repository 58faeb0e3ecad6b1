// ABOUTME: Drives lifecycle state from pod watch events.
// ABOUTME: The watch forwards signals over a channel; one task re-fetches pods and reconciles.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::api::{ClusterApi, WatchEvent, WatchStream};
use super::resources::{PodPhase, PodStatus};
use crate::runtime::types::Observed;
use crate::state::{LifecycleState, StateMachine};
use crate::types::PodId;

/// Lifecycle state a pod phase maps to.
pub fn lifecycle_state(phase: &PodPhase) -> LifecycleState {
    match phase {
        PodPhase::Running => LifecycleState::Running,
        PodPhase::Pending => LifecycleState::Initializing,
        PodPhase::Failed => LifecycleState::Failed,
        PodPhase::Succeeded => LifecycleState::Stopped,
        PodPhase::Unknown(_) => LifecycleState::Unknown,
    }
}

#[derive(Debug)]
enum Signal {
    Changed { pod: PodId, deleted: bool },
    Closed,
}

/// Everything the reconciler reads and writes.
#[derive(Clone)]
pub(crate) struct PodTracker {
    pub api: Arc<dyn ClusterApi>,
    pub namespace: String,
    pub container: String,
    pub pods: Arc<Mutex<Vec<PodId>>>,
    pub state: Arc<StateMachine>,
    pub observed: Arc<Observed>,
}

impl PodTracker {
    pub fn track(&self, pod: &PodId) {
        let mut pods = self.pods.lock();
        if !pods.contains(pod) {
            pods.push(pod.clone());
        }
    }

    pub fn first_pod(&self) -> Option<PodId> {
        self.pods.lock().first().cloned()
    }

    /// Feed one pod's reported status into the state machine.
    pub fn apply(&self, pod: &PodStatus) {
        if let Some(ip) = &pod.pod_ip {
            self.observed.set_ip_address(Some(ip.clone()));
        }
        self.observed.set_host(pod.host_ip.clone());
        if let Some(started) = pod.started_at {
            self.observed.mark_started(started);
        }
        if let Some(container) = pod.container(&self.container) {
            if let Some(code) = container.exit_code {
                self.observed.set_exit_code(code);
            }
            if let Some(finished) = container.finished_at {
                self.observed.mark_finished(finished);
            }
        }
        let next = lifecycle_state(&pod.phase);
        tracing::debug!(pod = %pod.name, phase = ?pod.phase, "pod maps to {}", next);
        // A task can finish between two observations; it still ran.
        if next == LifecycleState::Stopped && self.state.state() == LifecycleState::Initializing {
            self.state.try_change(LifecycleState::Running);
        }
        self.state.try_change(next);
    }

    /// Re-fetch every tracked pod and reconcile.
    async fn refresh(&self) {
        let pods: Vec<PodId> = self.pods.lock().clone();
        for pod in pods {
            match self.api.get_pod(&self.namespace, pod.as_str()).await {
                Ok(Some(status)) => self.apply(&status),
                Ok(None) => self.vanished(&pod),
                Err(e) => tracing::warn!(pod = %pod, "pod refresh failed: {}", e),
            }
        }
    }

    /// A tracked pod disappeared. Expected while tearing down, suspicious otherwise.
    fn vanished(&self, pod: &PodId) {
        self.pods.lock().retain(|p| p != pod);
        let current = self.state.state();
        if matches!(
            current,
            LifecycleState::Terminating | LifecycleState::Stopped | LifecycleState::Deleted
        ) {
            return;
        }
        tracing::warn!(pod = %pod, "pod disappeared while {}", current);
        self.state.try_change(LifecycleState::Unknown);
    }
}

/// Running watch: a forwarder draining the watch and a reconciler acting on it.
pub(crate) struct PodWatch {
    forwarder: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

impl PodWatch {
    pub fn spawn(tracker: PodTracker, events: WatchStream<PodStatus>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward(events, tx));
        let reconciler = tokio::spawn(reconcile(tracker, rx));
        Self {
            forwarder,
            reconciler,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.reconciler.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PodWatch {
    fn drop(&mut self) {
        self.forwarder.abort();
        self.reconciler.abort();
    }
}

async fn forward(mut events: WatchStream<PodStatus>, tx: mpsc::UnboundedSender<Signal>) {
    while let Some(event) = events.next().await {
        let signal = match event {
            WatchEvent::Added(pod) | WatchEvent::Modified(pod) => Signal::Changed {
                pod: pod.name,
                deleted: false,
            },
            WatchEvent::Deleted(pod) => Signal::Changed {
                pod: pod.name,
                deleted: true,
            },
            WatchEvent::Error(message) => {
                tracing::warn!("pod watch closed with error: {}", message);
                break;
            }
        };
        if tx.send(signal).is_err() {
            return;
        }
    }
    let _ = tx.send(Signal::Closed);
}

async fn reconcile(tracker: PodTracker, mut rx: mpsc::UnboundedReceiver<Signal>) {
    while let Some(signal) = rx.recv().await {
        match signal {
            Signal::Changed { pod, deleted } => {
                if deleted {
                    tracker.vanished(&pod);
                } else {
                    tracker.track(&pod);
                }
                tracker.refresh().await;
            }
            Signal::Closed => {
                tracker.refresh().await;
                tracing::debug!(namespace = %tracker.namespace, "pod watch closed");
                break;
            }
        }
    }
}
