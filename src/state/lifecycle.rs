// ABOUTME: The container lifecycle state enum and its static transition table.
// ABOUTME: Shared by every backend; only StateMachine mutates the current value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a container, independent of backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Uninitiated,
    Initializing,
    Running,
    Terminating,
    Stopped,
    Deleted,
    Failed,
    Unknown,
}

use LifecycleState::*;

impl LifecycleState {
    pub const ALL: [LifecycleState; 8] = [
        Uninitiated,
        Initializing,
        Running,
        Terminating,
        Stopped,
        Deleted,
        Failed,
        Unknown,
    ];

    /// States this one may move to.
    ///
    /// `Unknown` is entered when a backend reports something unrecognised and
    /// may be left for any state except `Uninitiated`.
    pub fn successors(self) -> &'static [LifecycleState] {
        match self {
            Uninitiated => &[Initializing],
            Initializing => &[Running, Failed, Unknown],
            Running => &[Terminating, Stopped, Failed, Unknown],
            Terminating => &[Stopped, Deleted, Failed, Unknown],
            Stopped => &[Deleted, Failed, Unknown],
            Deleted | Failed => &[],
            Unknown => &[Initializing, Running, Terminating, Stopped, Deleted, Failed],
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        self.successors().contains(&next)
    }

    /// States from which `self` can be reached.
    pub fn predecessors(self) -> Vec<LifecycleState> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(self))
            .collect()
    }

    /// Reaching a terminal state releases the completion latch.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stopped | Deleted | Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Uninitiated => "UNINITIATED",
            Initializing => "INITIALIZING",
            Running => "RUNNING",
            Terminating => "TERMINATING",
            Stopped => "STOPPED",
            Deleted => "DELETED",
            Failed => "FAILED",
            Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_and_failed_are_dead_ends() {
        assert!(Deleted.successors().is_empty());
        assert!(Failed.successors().is_empty());
    }

    #[test]
    fn running_cannot_skip_to_deleted() {
        assert!(!Running.can_transition_to(Deleted));
        assert!(Terminating.can_transition_to(Deleted));
    }

    #[test]
    fn predecessors_of_initializing() {
        assert_eq!(Initializing.predecessors(), vec![Uninitiated, Unknown]);
    }

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = LifecycleState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![Stopped, Deleted, Failed]);
    }
}
