//! Core payload model for the workflow engine.
//!
//! These types are the source of truth for what flows along graph edges:
//! a [`NodeOutput`] carries a data map and a metadata map, and a
//! distinguished metadata marker turns a payload into the termination
//! sentinel that directs downstream nodes to run `cleanup` instead of
//! `execute`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The node-visible key/value state on a payload.
pub type DataMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Pools and workflow kinds
// ---------------------------------------------------------------------------

/// The worker pool a node prefers for its `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPool {
    /// Cooperative execution on the shared event loop (I/O-bound nodes).
    Async,
    /// Bounded worker lane for blocking work.
    Thread,
    /// Bounded CPU-bound lane off the async loop entirely.
    Process,
}

/// The execution modes a node supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Continuous per-producer loop.
    Production,
    /// Single-pass request/response run.
    Api,
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// The two-part configuration record of a node definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigData {
    /// User-supplied field values, possibly containing template expressions.
    #[serde(default)]
    pub form: DataMap,
    /// Engine-assigned runtime parameters (e.g. an auto-mapped queue name).
    #[serde(default)]
    pub config: DataMap,
}

/// Static per-node configuration. Immutable after build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Graph-unique identifier, referenced by edges.
    pub id: String,
    /// Registry identifier of the node class (kebab-case).
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: NodeConfigData,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeConfigData::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata keys and reserved shapes
// ---------------------------------------------------------------------------

/// Engine-private metadata keys carried on [`NodeOutput::metadata`].
pub mod meta {
    /// Marks the termination sentinel.
    pub const EXECUTION_COMPLETED: &str = "__execution_completed__";
    /// Set on API-mode runs; a webhook producer then consumes the request
    /// body directly instead of subscribing to its pub/sub channel.
    pub const API_MODE: &str = "__api_mode__";
    /// HTTP request context (headers, query params, method) for API runs.
    pub const REQUEST_CONTEXT: &str = "__request_context__";
    /// Workflow-level environment values from the definition.
    pub const WORKFLOW_ENV: &str = "workflow_env";
    /// Shared runtime map snapshot.
    pub const RUNTIME: &str = "runtime";
    /// Id of the node that produced the payload.
    pub const SOURCE_NODE_ID: &str = "source_node_id";
    /// Operation tag of the producing node.
    pub const OPERATION: &str = "operation";
}

/// Data key marking the reserved HTTP response shape
/// (`{"__http_response__": true, "status": …, "body": …}`).
pub const HTTP_RESPONSE_MARKER: &str = "__http_response__";

// ---------------------------------------------------------------------------
// NodeOutput
// ---------------------------------------------------------------------------

/// The in-flight payload moved along graph edges.
///
/// Created empty by the runner for producers, then passed by move through
/// the graph. Parallel branches each receive their own clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Stable identifier of this unit of work.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Main data payload; downstream nodes add keys to it.
    #[serde(default)]
    pub data: DataMap,
    /// Routing hints and engine-private markers.
    #[serde(default)]
    pub metadata: DataMap,
}

impl NodeOutput {
    /// An empty payload with a fresh id (producer input).
    pub fn empty() -> Self {
        Self::new(DataMap::new())
    }

    pub fn new(data: DataMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            metadata: DataMap::new(),
        }
    }

    pub fn with_parts(id: Uuid, data: DataMap, metadata: DataMap) -> Self {
        Self { id, data, metadata }
    }

    /// The termination sentinel: keeps the id/data of the exhausted
    /// iteration and sets the completion marker in its metadata.
    pub fn completed(id: Uuid, data: DataMap) -> Self {
        let mut metadata = DataMap::new();
        metadata.insert(meta::EXECUTION_COMPLETED.to_owned(), Value::Bool(true));
        Self { id, data, metadata }
    }

    pub fn is_execution_completed(&self) -> bool {
        self.metadata
            .get(meta::EXECUTION_COMPLETED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_api_mode(&self) -> bool {
        self.metadata
            .get(meta::API_MODE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The reserved HTTP response marker on the data map.
    pub fn is_http_response(&self) -> bool {
        self.data
            .get(HTTP_RESPONSE_MARKER)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Key collision policy
// ---------------------------------------------------------------------------

/// Resolve a unique key for a node's principal output.
///
/// The first writer keeps the base key; later writers get `base_2`,
/// `base_3`, … so nodes of the same type never overwrite each other.
pub fn unique_output_key(data: &DataMap, base_key: &str) -> String {
    if !data.contains_key(base_key) {
        return base_key.to_owned();
    }
    let mut counter = 2usize;
    loop {
        let candidate = format!("{base_key}_{counter}");
        if !data.contains_key(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_key_returns_base_when_missing() {
        assert_eq!(unique_output_key(&DataMap::new(), "counter"), "counter");
    }

    #[test]
    fn unique_key_appends_counter_on_collision() {
        let mut data = DataMap::new();
        data.insert("k".into(), json!(1));
        assert_eq!(unique_output_key(&data, "k"), "k_2");
        data.insert("k_2".into(), json!(2));
        assert_eq!(unique_output_key(&data, "k"), "k_3");
    }

    #[test]
    fn sentinel_round_trips_through_json() {
        let sentinel = NodeOutput::completed(Uuid::new_v4(), DataMap::new());
        let serialized = serde_json::to_value(&sentinel).unwrap();
        let restored: NodeOutput = serde_json::from_value(serialized).unwrap();
        assert!(restored.is_execution_completed());
        assert_eq!(restored.id, sentinel.id);
    }

    #[test]
    fn plain_payload_is_not_a_sentinel() {
        assert!(!NodeOutput::empty().is_execution_completed());
    }

    #[test]
    fn http_response_marker_is_detected() {
        let mut data = DataMap::new();
        data.insert(HTTP_RESPONSE_MARKER.into(), json!(true));
        data.insert("status".into(), json!(201));
        let output = NodeOutput::new(data);
        assert!(output.is_http_response());
    }
}
