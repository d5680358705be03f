//! `engine` crate — graph construction, post-processing, and the two
//! execution runners.
//!
//! The engine loads a directed graph of typed nodes from JSON, validates
//! it, and drives execution either continuously (one production loop per
//! producer node) or once per request (the single-pass API runner). It
//! polymorphs over the [`nodes::WorkflowNode`] contract and never knows
//! concrete node types.

pub mod analyzer;
pub mod builder;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod graph;
pub mod postprocess;
pub mod session;
pub mod snapshot;

pub use analyzer::FlowAnalyzer;
pub use builder::{EdgeDefinition, FlowBuilder, WorkflowDefinition};
pub use engine::{api_response_parts, FlowEngine, IterationOutcome};
pub use error::EngineError;
pub use events::{EventEmitter, EventKind, ExecutionStateTracker, FullState, WorkflowEvent};
pub use execution::api_runner::ApiFlowRunner;
pub use execution::pool::PoolExecutor;
pub use execution::runner::FlowRunner;
pub use graph::{FlowGraph, FlowNode};
