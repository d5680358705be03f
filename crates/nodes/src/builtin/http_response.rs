//! HTTP response node — reserved response shape for API workflows.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::error;

use crate::error::NodeError;
use crate::payload::{
    ExecutionPool, NodeConfig, NodeOutput, WorkflowKind, HTTP_RESPONSE_MARKER,
};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "http-response";

/// Emits the reserved `{"__http_response__": true, "status": …, "body": …}`
/// shape. When this is the last executed node of an API run, the HTTP
/// layer returns the configured status and body instead of the default
/// envelope. `body_source` is `from_input` (pass the upstream data
/// through) or `custom` (a JSON template).
pub struct HttpResponseNode {
    base: NodeBase,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(HttpResponseNode {
        base: NodeBase::new(config),
    }))
}

#[async_trait]
impl WorkflowNode for HttpResponseNode {
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
        ExecutionPool::Async
    }

    fn supported_workflow_types(&self) -> &'static [WorkflowKind] {
        // Request/response only; meaningless in a production loop.
        &[WorkflowKind::Api]
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let status = self.base.form_i64("status_code", 200);
        if !(100..=599).contains(&status) {
            errors.push(format!("status_code {status} is out of range"));
        }
        if let Some(source) = self.base.form_str("body_source") {
            if source != "from_input" && source != "custom" {
                errors.push(format!("body_source must be from_input or custom, got '{source}'"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn execute(&self, input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let status = self.base.form_i64("status_code", 200);
        let body_source = self
            .base
            .form_str("body_source")
            .unwrap_or_else(|| "from_input".to_owned());

        let body = if body_source == "from_input" {
            Value::Object(input.data.clone())
        } else {
            let raw = self
                .base
                .rendered_form_str("body_json", &input)?
                .unwrap_or_default();
            let raw = raw.trim();
            if raw.is_empty() {
                json!({})
            } else {
                serde_json::from_str(raw).map_err(|e| {
                    error!(node_id = self.base.id(), error = %e, "invalid custom body JSON");
                    NodeError::InvalidField {
                        field: "body_json",
                        reason: format!("custom body is not valid JSON: {e}"),
                    }
                })?
            }
        };

        let mut data = serde_json::Map::new();
        data.insert(HTTP_RESPONSE_MARKER.to_owned(), json!(true));
        data.insert("status".to_owned(), json!(status));
        data.insert("body".to_owned(), body);

        Ok(NodeOutput::with_parts(input.id, data, input.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_input_passes_upstream_data_as_body() {
        let mut config = NodeConfig::new("h1", IDENTIFIER);
        config.data.form = json!({ "status_code": 201 }).as_object().cloned().unwrap();
        let node = create(config).unwrap();

        let mut input = NodeOutput::empty();
        input.data.insert("result".into(), json!("ok"));

        let output = node.execute(input).await.unwrap();
        assert!(output.is_http_response());
        assert_eq!(output.data["status"], 201);
        assert_eq!(output.data["body"]["result"], "ok");
    }

    #[tokio::test]
    async fn custom_body_is_rendered_and_parsed() {
        let mut config = NodeConfig::new("h2", IDENTIFIER);
        config.data.form = json!({
            "body_source": "custom",
            "body_json": r#"{"greeting": "{{ data.name }}"}"#,
        })
        .as_object()
        .cloned()
        .unwrap();
        let node = create(config).unwrap();

        let mut input = NodeOutput::empty();
        input.data.insert("name".into(), json!("Ada"));

        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data["body"]["greeting"], "Ada");
    }

    #[test]
    fn out_of_range_status_fails_readiness() {
        let mut config = NodeConfig::new("h3", IDENTIFIER);
        config.data.form = json!({ "status_code": 99 }).as_object().cloned().unwrap();
        let node = create(config).unwrap();
        assert!(node.is_ready().is_err());
    }
}
