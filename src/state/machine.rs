// ABOUTME: Guarded lifecycle state machine with per-state and completion latches.
// ABOUTME: All transitions go through one lock; latches are released while it is held.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use super::{Latch, LifecycleState};
use crate::error::{Error, Result};

/// Current lifecycle state of one container plus the latches waiters block on.
///
/// Latches are released under the same lock that writes the state, so a
/// waiter that wakes on the completion latch always reads a terminal state.
#[derive(Debug)]
pub struct StateMachine {
    name: String,
    current: Mutex<LifecycleState>,
    reached: HashMap<LifecycleState, Latch>,
    completion: Latch,
}

impl StateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        let reached: HashMap<_, _> = LifecycleState::ALL
            .into_iter()
            .map(|s| (s, Latch::new()))
            .collect();
        reached[&LifecycleState::Uninitiated].release();
        Self {
            name: name.into(),
            current: Mutex::new(LifecycleState::Uninitiated),
            reached,
            completion: Latch::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.current.lock()
    }

    /// Fail with `IllegalState` unless the current state is one of `required`.
    pub fn require(&self, required: &[LifecycleState]) -> Result<LifecycleState> {
        let current = self.state();
        if required.contains(&current) {
            Ok(current)
        } else {
            Err(Error::IllegalState {
                actual: current,
                required: required.to_vec(),
            })
        }
    }

    /// Move to `next`.
    ///
    /// When `required` is non-empty the current state must be one of them.
    /// Moving to the current state is a no-op; a move the transition table
    /// does not allow leaves the state untouched and fails.
    pub fn change(&self, next: LifecycleState, required: &[LifecycleState]) -> Result<()> {
        self.apply(next, required).map(|_| ())
    }

    /// Lenient `change` for watch and background paths. Returns whether the state moved.
    pub fn try_change(&self, next: LifecycleState) -> bool {
        match self.apply(next, &[]) {
            Ok(moved) => moved,
            Err(e) => {
                tracing::debug!(container = %self.name, "ignoring transition: {}", e);
                false
            }
        }
    }

    fn apply(&self, next: LifecycleState, required: &[LifecycleState]) -> Result<bool> {
        let mut current = self.current.lock();
        let previous = *current;

        if !required.is_empty() && !required.contains(&previous) {
            return Err(Error::IllegalState {
                actual: previous,
                required: required.to_vec(),
            });
        }
        if previous == next {
            return Ok(false);
        }
        if !previous.can_transition_to(next) {
            return Err(Error::IllegalState {
                actual: previous,
                required: next.predecessors(),
            });
        }

        *current = next;
        tracing::info!(container = %self.name, "state {} -> {}", previous, next);

        if let Some(latch) = self.reached.get(&next) {
            latch.release();
        }
        if next.is_terminal() && self.completion.release() {
            tracing::debug!(container = %self.name, "completion reached in {}", next);
        }
        Ok(true)
    }

    /// Wait until `state` has been reached at least once.
    ///
    /// `None` or a zero timeout waits indefinitely. Returns `false` on timeout.
    pub async fn wait_for_state(&self, state: LifecycleState, timeout: Option<Duration>) -> bool {
        match self.reached.get(&state) {
            Some(latch) => latch.wait(timeout).await,
            None => false,
        }
    }

    /// Wait until any terminal state has been reached.
    pub async fn wait_for_completion(&self, timeout: Option<Duration>) -> bool {
        self.completion.wait(timeout).await
    }

    pub fn is_complete(&self) -> bool {
        self.completion.is_released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn starts_uninitiated() {
        let sm = StateMachine::new("t");
        assert_eq!(sm.state(), Uninitiated);
        assert!(!sm.is_complete());
    }

    #[test]
    fn required_prior_state_is_enforced() {
        let sm = StateMachine::new("t");
        let err = sm.change(Initializing, &[Running]).unwrap_err();
        assert!(matches!(
            err,
            Error::IllegalState {
                actual: Uninitiated,
                ..
            }
        ));
        assert_eq!(sm.state(), Uninitiated);
    }

    #[test]
    fn same_state_is_a_no_op() {
        let sm = StateMachine::new("t");
        sm.change(Initializing, &[]).unwrap();
        sm.change(Initializing, &[]).unwrap();
        assert!(!sm.try_change(Initializing));
        assert_eq!(sm.state(), Initializing);
    }

    #[test]
    fn illegal_move_keeps_state() {
        let sm = StateMachine::new("t");
        sm.change(Initializing, &[]).unwrap();
        sm.change(Running, &[]).unwrap();
        assert!(sm.change(Deleted, &[]).is_err());
        assert!(!sm.try_change(Initializing));
        assert_eq!(sm.state(), Running);
    }

    #[test]
    fn terminal_state_releases_completion() {
        let sm = StateMachine::new("t");
        sm.change(Initializing, &[]).unwrap();
        sm.change(Failed, &[Initializing]).unwrap();
        assert!(sm.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_unreached_state_times_out() {
        let sm = StateMachine::new("t");
        assert!(!sm.wait_for_state(Running, Some(Duration::from_secs(1))).await);
        assert!(sm.wait_for_state(Uninitiated, Some(Duration::from_secs(1))).await);
    }
}
