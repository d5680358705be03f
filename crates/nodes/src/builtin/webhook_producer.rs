//! Webhook producer — entry point for externally triggered flows.
//!
//! Production mode subscribes to the pub/sub channel named by
//! `webhook_id` and blocks until a message is published. API mode uses
//! the request body already present on the payload, together with the
//! request context the engine attached to the metadata.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::error::NodeError;
use crate::payload::{meta, unique_output_key, ExecutionPool, NodeConfig, NodeOutput, WorkflowKind};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "webhook-producer";

pub struct WebhookProducerNode {
    base: NodeBase,
    store: storage::DataStore,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(WebhookProducerNode {
        base: NodeBase::new(config),
        store: storage::DataStore::shared(),
    }))
}

impl WebhookProducerNode {
    fn webhook_id(&self) -> Result<String, NodeError> {
        self.base.require_form_str("webhook_id")
    }

    fn finish(&self, mut input: NodeOutput, api_mode: bool) -> NodeOutput {
        input
            .metadata
            .insert(meta::SOURCE_NODE_ID.to_owned(), json!(self.base.id()));
        input
            .metadata
            .insert(meta::OPERATION.to_owned(), json!("webhook_receive"));
        if api_mode {
            // Preserve the marker for downstream nodes.
            input.metadata.insert(meta::API_MODE.to_owned(), json!(true));
        }
        input
    }
}

#[async_trait]
impl WorkflowNode for WebhookProducerNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Producer
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn supported_workflow_types(&self) -> &'static [WorkflowKind] {
        &[WorkflowKind::Production, WorkflowKind::Api]
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("webhook_id") {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(vec!["webhook_id is required".to_owned()]),
        }
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let webhook_id = self.webhook_id()?;

        if input.is_api_mode() {
            // API mode: the request body is already the payload data.
            let request_context = input
                .metadata
                .get(meta::REQUEST_CONTEXT)
                .cloned()
                .unwrap_or_else(|| json!({}));

            let output_key = unique_output_key(&input.data, "webhook");
            let body = Value::Object(input.data.clone());
            input.data.insert(
                output_key,
                json!({
                    "webhook_id": webhook_id,
                    "data": {
                        "body": body,
                        "headers": request_context.get("headers").cloned().unwrap_or(json!({})),
                        "method": request_context.get("method").cloned().unwrap_or(json!("POST")),
                        "query_params": request_context.get("query_params").cloned().unwrap_or(json!({})),
                    },
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            );

            info!(node_id = self.base.id(), %webhook_id, "processed webhook input directly");
            return Ok(self.finish(input, true));
        }

        // Production mode: block until something is published.
        info!(node_id = self.base.id(), %webhook_id, "waiting for webhook data");
        let received = self.store.webhooks().subscribe(&webhook_id).await?;

        let output_key = unique_output_key(&input.data, "webhook");
        input.data.insert(
            output_key,
            json!({
                "webhook_id": webhook_id,
                "data": received,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );

        info!(node_id = self.base.id(), %webhook_id, "received webhook data");
        Ok(self.finish(input, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(webhook_id: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("w1", IDENTIFIER);
        config.data.form = json!({ "webhook_id": webhook_id })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn api_mode_wraps_the_request_body() {
        let node = producer("hook-api-test");
        let mut input = NodeOutput::empty();
        input.data.insert("name".into(), json!("Ada"));
        input.metadata.insert(meta::API_MODE.into(), json!(true));
        input.metadata.insert(
            meta::REQUEST_CONTEXT.into(),
            json!({ "method": "POST", "headers": { "x-test": "1" } }),
        );

        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data["webhook"]["webhook_id"], "hook-api-test");
        assert_eq!(output.data["webhook"]["data"]["body"]["name"], "Ada");
        assert_eq!(output.data["webhook"]["data"]["headers"]["x-test"], "1");
        assert!(output.is_api_mode());
    }

    #[tokio::test]
    async fn production_mode_blocks_until_publish() {
        let node = producer("hook-prod-test");
        let handle = {
            let node = node.clone();
            tokio::spawn(async move { node.execute(NodeOutput::empty()).await })
        };

        tokio::task::yield_now().await;
        storage::DataStore::shared()
            .webhooks()
            .publish("hook-prod-test", &json!({ "body": { "k": "v" } }))
            .unwrap();

        let output = handle.await.unwrap().unwrap();
        assert_eq!(output.data["webhook"]["data"]["body"]["k"], "v");
    }
}
