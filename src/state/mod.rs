// ABOUTME: Unified container lifecycle states and the guarded state machine.
// ABOUTME: Exports LifecycleState, StateMachine, and the one-shot Latch.

mod latch;
mod lifecycle;
mod machine;

pub use latch::Latch;
pub use lifecycle::LifecycleState;
pub use machine::StateMachine;
