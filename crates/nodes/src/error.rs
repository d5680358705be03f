//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's lifecycle methods.
///
/// There is no retry classification: production runners keep looping
/// through failures, API runs surface them to the caller.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A required form/config field is absent.
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A field is present but unusable.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Template rendering or expression evaluation failed.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry has no factory for the requested type.
    #[error("unknown node type '{requested}'; available types: {available:?}")]
    UnknownType {
        requested: String,
        available: Vec<&'static str>,
    },

    /// `init` found the node unvalidated and not ready.
    #[error("node '{node_id}' is not ready: {errors:?}")]
    NotReady { node_id: String, errors: Vec<String> },

    /// Catch-all runtime failure from a node body.
    #[error("{0}")]
    Failed(String),
}
