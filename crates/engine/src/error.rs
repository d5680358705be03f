//! Engine-level error types.

use std::time::Duration;

use nodes::NodeError;
use thiserror::Error;

/// Errors produced by the workflow engine (build, validation, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Build errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// An edge connects a node to itself.
    #[error("self-referential edge on node '{0}'")]
    SelfReference(String),

    /// The same (source, target, branch key) edge appeared twice.
    #[error("duplicate edge {from} -> {to} on branch '{key}'")]
    DuplicateEdge {
        from: String,
        to: String,
        key: String,
    },

    /// The graph is not acyclic.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// Node instantiation failed (unknown type or bad config).
    #[error("could not build node: {0}")]
    Build(#[from] NodeError),

    // ------ Validation errors ------

    /// One or more nodes failed their readiness check.
    #[error("workflow validation failed:\n{report}")]
    ValidationFailed { report: String },

    // ------ Execution errors ------

    /// Lookup of a graph node by id failed.
    #[error("node '{0}' not found in the graph")]
    NodeNotFound(String),

    #[error("no first node found in the workflow")]
    EmptyWorkflow,

    #[error("node '{0}' is not a producer")]
    NotAProducer(String),

    #[error("node '{0}' is not a loop node")]
    NotALoopNode(String),

    /// API runs must start from a producer that supports API mode.
    #[error("API workflows must start with an api-capable producer; found '{0}'")]
    InvalidApiStartNode(String),

    /// A node's lifecycle method failed at runtime.
    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// The enclosing deadline of an API run expired.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// Iterate-and-stop was asked for an index outside the array.
    #[error("iteration index {index} out of range [0, {len})")]
    IterationOutOfRange { index: usize, len: usize },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Store(#[from] storage::StoreError),
}
