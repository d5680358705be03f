//! Data transformer — reshapes the payload through a JSON template.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::NodeError;
use crate::payload::{meta, ExecutionPool, NodeConfig, NodeOutput};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "data-transformer";

/// Renders `output_template` (a JSON document with template expressions)
/// against the incoming data and **replaces** the payload's data with the
/// parsed result. Dropping, renaming, and computing fields all happen in
/// one template.
pub struct DataTransformerNode {
    base: NodeBase,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(DataTransformerNode {
        base: NodeBase::new(config),
    }))
}

#[async_trait]
impl WorkflowNode for DataTransformerNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Blocking
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Thread
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("output_template") {
            Some(template) if !template.trim().is_empty() => Ok(()),
            _ => Err(vec!["output_template is required".to_owned()]),
        }
    }

    async fn execute(&self, input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let rendered = self
            .base
            .rendered_form_str("output_template", &input)?
            .unwrap_or_default();

        if rendered.trim().is_empty() {
            return Err(NodeError::MissingField {
                field: "output_template",
            });
        }

        let transformed: Value = serde_json::from_str(&rendered).map_err(|e| {
            error!(
                node_id = self.base.id(),
                error = %e,
                "output template did not render to valid JSON"
            );
            NodeError::InvalidField {
                field: "output_template",
                reason: format!("rendered template is not valid JSON: {e}"),
            }
        })?;

        let data = match transformed {
            Value::Object(map) => map,
            other => {
                // Non-object templates land under a single key so the
                // payload's data stays a map.
                let mut map = serde_json::Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };

        info!(
            node_id = self.base.id(),
            keys = ?data.keys().collect::<Vec<_>>(),
            "data transformation completed"
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert(meta::SOURCE_NODE_ID.to_owned(), json!(self.base.id()));
        metadata.insert(meta::OPERATION.to_owned(), json!("data_transform"));

        Ok(NodeOutput::with_parts(input.id, data, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer(template: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("t1", IDENTIFIER);
        config.data.form = json!({ "output_template": template })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn replaces_data_with_rendered_template() {
        let node = transformer(r#"{"upper": "{{ data.name|upper }}"}"#);
        let mut input = NodeOutput::empty();
        input.data.insert("name".into(), json!("Ada"));

        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data.len(), 1);
        assert_eq!(output.data["upper"], "ADA");
    }

    #[tokio::test]
    async fn invalid_json_after_rendering_is_an_error() {
        let node = transformer(r#"{"broken": {{ data.name }}"#);
        let mut input = NodeOutput::empty();
        input.data.insert("name".into(), json!("x"));
        assert!(node.execute(input).await.is_err());
    }
}
