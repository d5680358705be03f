//! Execution: pool dispatch, the two runners, fork-join, sub-DAG loops.

pub mod api_runner;
pub mod context;
pub mod fork_join;
pub mod pool;
pub mod runner;
pub mod subdag;

pub use context::{ExecContext, SharedRuntime};
