//! Loop node — resolves the iteration array for the runner.
//!
//! The node itself only resolves `array_expression` into `data.items`;
//! the runner walks the "subdag" branch once per element and collects the
//! results.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::NodeError;
use crate::payload::{ExecutionPool, NodeConfig, NodeOutput};
use crate::template;
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "for-each";

pub struct ForEachNode {
    base: NodeBase,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(ForEachNode {
        base: NodeBase::new(config),
    }))
}

/// Resolve the expression to an array: a rendered template or literal that
/// parses as JSON, an expression over the data (`data.list`), or a bare
/// dotted path. Anything that is not an array resolves to empty.
fn resolve_items(raw: &str, input: &NodeOutput) -> Vec<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let rendered = if template::contains_template(raw) {
        match template::render(raw, &input.data) {
            Ok(rendered) => rendered,
            Err(_) => return Vec::new(),
        }
    } else {
        raw.to_owned()
    };

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&rendered) {
        return items;
    }
    if let Ok(Value::Array(items)) = template::eval_expression(&rendered, &input.data) {
        return items;
    }

    // Bare key path, e.g. "items" or "payload.list".
    let root = Value::Object(input.data.clone());
    let mut current = &root;
    for part in rendered.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    current.as_array().cloned().unwrap_or_default()
}

#[async_trait]
impl WorkflowNode for ForEachNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Loop
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("array_expression") {
            Some(expr) if !expr.trim().is_empty() => Ok(()),
            _ => Err(vec!["array_expression is required".to_owned()]),
        }
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let raw = self.base.form_str("array_expression").unwrap_or_default();
        let items = resolve_items(&raw, &input);

        info!(node_id = self.base.id(), count = items.len(), "resolved iteration array");

        input.data.insert("items".to_owned(), Value::Array(items));
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn for_each(expr: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("fe1", IDENTIFIER);
        config.data.form = json!({ "array_expression": expr })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn resolves_json_literal() {
        let node = for_each(r#"[1, 2, 3]"#);
        let output = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(output.data["items"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn resolves_data_expression() {
        let node = for_each("data.list");
        let mut input = NodeOutput::empty();
        input.data.insert("list".into(), json!(["a", "b"]));
        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data["items"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn resolves_bare_key_path() {
        let node = for_each("payload.list");
        let mut input = NodeOutput::empty();
        input
            .data
            .insert("payload".into(), json!({ "list": [10] }));
        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data["items"], json!([10]));
    }

    #[tokio::test]
    async fn non_array_resolves_to_empty() {
        let node = for_each("data.missing");
        let output = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(output.data["items"], json!([]));
    }
}
