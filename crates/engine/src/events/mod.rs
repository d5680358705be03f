//! Lifecycle events and real-time execution state.

pub mod emitter;
pub mod state;

pub use emitter::{EventEmitter, EventKind, WorkflowEvent};
pub use state::{ExecutionStateTracker, FullState, WorkflowStatus};
