//! The `WorkflowNode` trait — the contract every node must fulfil.
//!
//! Defined here (in the nodes crate) so both the engine and individual
//! node implementations can import it without a circular dependency.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::NodeError;
use crate::payload::{DataMap, ExecutionPool, NodeConfig, NodeOutput, WorkflowKind};
use crate::template;

// ---------------------------------------------------------------------------
// Node kinds and ports
// ---------------------------------------------------------------------------

/// The five execution roles a node can play. Runners switch on this to
/// decide traversal: producers start loops, non-blocking nodes end a
/// path, conditionals pick a branch, loop nodes iterate a sub-DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Producer,
    Blocking,
    NonBlocking,
    Conditional,
    Loop,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Producer => "producer",
            NodeKind::Blocking => "blocking",
            NodeKind::NonBlocking => "non_blocking",
            NodeKind::Conditional => "conditional",
            NodeKind::Loop => "loop",
        }
    }
}

/// Role of a queue endpoint node, used by the queue-mapping pass to find
/// writer/reader pairs without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    Writer,
    Reader,
}

/// A named input or output port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub id: &'static str,
    pub label: &'static str,
}

impl Port {
    pub const fn new(id: &'static str, label: &'static str) -> Self {
        Self { id, label }
    }
}

// ---------------------------------------------------------------------------
// NodeBase — shared state every node embeds
// ---------------------------------------------------------------------------

/// Per-instance state shared by all node implementations: the static
/// config, the engine-assigned runtime config overlay, the validation
/// flag, and the execution counter.
pub struct NodeBase {
    config: NodeConfig,
    runtime_config: Mutex<DataMap>,
    validated: AtomicBool,
    execution_count: AtomicU64,
}

impl NodeBase {
    pub fn new(config: NodeConfig) -> Self {
        let runtime_config = Mutex::new(config.data.config.clone());
        Self {
            config,
            runtime_config,
            validated: AtomicBool::new(false),
            execution_count: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // ------ form values ------

    pub fn form_value(&self, key: &str) -> Option<&Value> {
        self.config.data.form.get(key)
    }

    /// Raw form value as a string (numbers and booleans stringified).
    pub fn form_str(&self, key: &str) -> Option<String> {
        self.form_value(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn form_i64(&self, key: &str, default: i64) -> i64 {
        self.form_value(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn form_f64(&self, key: &str, default: f64) -> f64 {
        self.form_value(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    /// Form value with any template expression rendered against the
    /// incoming payload's data.
    pub fn rendered_form_str(
        &self,
        key: &str,
        payload: &NodeOutput,
    ) -> Result<Option<String>, NodeError> {
        match self.form_str(key) {
            Some(raw) if template::contains_template(&raw) => {
                Ok(Some(template::render(&raw, &payload.data)?))
            }
            other => Ok(other),
        }
    }

    pub fn require_form_str(&self, key: &'static str) -> Result<String, NodeError> {
        self.form_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or(NodeError::MissingField { field: key })
    }

    // ------ runtime config overlay ------

    /// Engine-assigned config value; falls back to the static config.
    pub fn config_value(&self, key: &str) -> Option<Value> {
        let overlay = self.runtime_config.lock().expect("node config lock poisoned");
        overlay.get(key).cloned()
    }

    pub fn config_str(&self, key: &str) -> Option<String> {
        self.config_value(key).and_then(|value| match value {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn set_config_value(&self, key: &str, value: Value) {
        let mut overlay = self.runtime_config.lock().expect("node config lock poisoned");
        overlay.insert(key.to_owned(), value);
    }

    // ------ lifecycle bookkeeping ------

    pub fn mark_validated(&self) {
        self.validated.store(true, Ordering::Release);
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    /// Completed executions so far. Incremented by the dispatcher after
    /// each successful `execute`.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    pub fn bump_execution_count(&self) -> u64 {
        self.execution_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ---------------------------------------------------------------------------
// The contract
// ---------------------------------------------------------------------------

/// The core node trait.
///
/// Runners never call `execute` directly; the engine's dispatcher wraps
/// it with sentinel handling (a terminated payload triggers [`cleanup`]
/// instead) and the execution counter.
///
/// [`cleanup`]: WorkflowNode::cleanup
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// The embedded shared state.
    fn base(&self) -> &NodeBase;

    /// Registry identifier of this node class (kebab-case).
    fn node_type(&self) -> &'static str;

    fn kind(&self) -> NodeKind;

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn input_ports(&self) -> Vec<Port> {
        match self.kind() {
            // Producers start the flow; they have no inputs.
            NodeKind::Producer => Vec::new(),
            _ => vec![Port::new("default", "In")],
        }
    }

    fn output_ports(&self) -> Vec<Port> {
        match self.kind() {
            NodeKind::Conditional => vec![Port::new("yes", "Yes"), Port::new("no", "No")],
            NodeKind::Loop => vec![Port::new("default", "Out"), Port::new("subdag", "Each")],
            _ => vec![Port::new("default", "Out")],
        }
    }

    fn supported_workflow_types(&self) -> &'static [WorkflowKind] {
        &[WorkflowKind::Production, WorkflowKind::Api]
    }

    fn queue_role(&self) -> Option<QueueRole> {
        None
    }

    /// Configuration validation, called by the validator pass.
    ///
    /// Fields holding template expressions are only checked for presence;
    /// their full validation happens at runtime after rendering.
    fn is_ready(&self) -> Result<(), Vec<String>> {
        Ok(())
    }

    /// One-time resource setup, called from `init`.
    async fn setup(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Called once before the first `execute` on each runner's reachable
    /// set. Validates unless the validator pass already did.
    async fn init(&self) -> Result<(), NodeError> {
        if !self.base().is_validated() {
            self.is_ready().map_err(|errors| NodeError::NotReady {
                node_id: self.base().id().to_owned(),
                errors,
            })?;
            self.base().mark_validated();
        }
        self.setup().await
    }

    /// The node body: receives the upstream payload, returns its
    /// successor payload (possibly the termination sentinel).
    async fn execute(&self, input: NodeOutput) -> Result<NodeOutput, NodeError>;

    /// Called at runner shutdown and whenever the node receives the
    /// sentinel. `input` is the sentinel payload when one triggered it.
    async fn cleanup(&self, _input: Option<&NodeOutput>) -> Result<(), NodeError> {
        Ok(())
    }

    /// The branch chosen by a conditional node after `execute` ("yes" or
    /// "no"). `None` for every other kind.
    fn route(&self) -> Option<&'static str> {
        None
    }
}

impl std::fmt::Debug for dyn WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("node_type", &self.node_type())
            .field("id", &self.base().id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_with_form(form: Value) -> NodeBase {
        let mut config = NodeConfig::new("n1", "test-node");
        config.data.form = form.as_object().cloned().unwrap_or_default();
        NodeBase::new(config)
    }

    #[test]
    fn form_str_stringifies_non_strings() {
        let base = base_with_form(json!({ "text": "hi", "count": 5 }));
        assert_eq!(base.form_str("text").as_deref(), Some("hi"));
        assert_eq!(base.form_str("count").as_deref(), Some("5"));
        assert_eq!(base.form_str("missing"), None);
    }

    #[test]
    fn rendered_form_str_renders_templates_only() {
        let base = base_with_form(json!({ "plain": "x", "tpl": "{{ data.name }}" }));
        let mut payload = NodeOutput::empty();
        payload.data.insert("name".into(), json!("Ada"));

        assert_eq!(
            base.rendered_form_str("plain", &payload).unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(
            base.rendered_form_str("tpl", &payload).unwrap().as_deref(),
            Some("Ada")
        );
    }

    #[test]
    fn runtime_config_overlays_static_config() {
        let base = base_with_form(json!({}));
        assert_eq!(base.config_str("queue_name"), None);
        base.set_config_value("queue_name", json!("queue_a_b"));
        assert_eq!(base.config_str("queue_name").as_deref(), Some("queue_a_b"));
    }

    #[test]
    fn execution_counter_increments() {
        let base = base_with_form(json!({}));
        assert_eq!(base.execution_count(), 0);
        assert_eq!(base.bump_execution_count(), 1);
        assert_eq!(base.execution_count(), 1);
    }
}
