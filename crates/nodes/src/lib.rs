//! `nodes` crate — the payload model, the `WorkflowNode` contract, and the
//! built-in node implementations.
//!
//! Every node — built-in and external alike — implements [`WorkflowNode`].
//! The engine crate dispatches execution through this trait object and
//! never knows concrete node types; it switches on [`NodeKind`] for the
//! traversal rules (producers start loops, non-blocking nodes end them,
//! conditionals pick a branch, loop nodes iterate a sub-DAG).

pub mod builtin;
pub mod error;
pub mod mock;
pub mod payload;
pub mod registry;
pub mod template;
pub mod traits;

pub use error::NodeError;
pub use payload::{DataMap, ExecutionPool, NodeConfig, NodeConfigData, NodeOutput, WorkflowKind};
pub use registry::NodeRegistry;
pub use traits::{NodeBase, NodeKind, Port, QueueRole, WorkflowNode};
