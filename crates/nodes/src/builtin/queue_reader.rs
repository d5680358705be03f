//! Queue reader — producer popping payloads off a queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::payload::{ExecutionPool, NodeConfig, NodeOutput, WorkflowKind};
use crate::traits::{NodeBase, NodeKind, QueueRole, WorkflowNode};

pub const IDENTIFIER: &str = "queue-reader";

/// Producer that blocks on `config.queue_name` until a payload arrives.
/// A popped sentinel propagates as-is, terminating this runner's loop.
pub struct QueueReaderNode {
    base: NodeBase,
    store: storage::DataStore,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(QueueReaderNode {
        base: NodeBase::new(config),
        store: storage::DataStore::shared(),
    }))
}

impl QueueReaderNode {
    fn queue_name(&self) -> Result<String, NodeError> {
        self.base
            .config_str("queue_name")
            .filter(|name| !name.is_empty() && name != "default")
            .ok_or(NodeError::MissingField { field: "queue_name" })
    }
}

#[async_trait]
impl WorkflowNode for QueueReaderNode {
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

    fn queue_role(&self) -> Option<QueueRole> {
        Some(QueueRole::Reader)
    }

    fn supported_workflow_types(&self) -> &'static [WorkflowKind] {
        &[WorkflowKind::Production]
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.queue_name() {
            Ok(_) => Ok(()),
            Err(_) => Err(vec![
                "queue_name is not assigned; connect a queue writer to this reader".to_owned(),
            ]),
        }
    }

    async fn execute(&self, _input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let queue_name = self.queue_name()?;
        debug!(node_id = self.base.id(), %queue_name, "waiting on queue");

        // Blocks until a value is pushed.
        let value = self
            .store
            .queue()
            .pop(&queue_name, None)
            .await?
            .ok_or_else(|| NodeError::Failed(format!("queue '{queue_name}' yielded no value")))?;

        let payload: NodeOutput = serde_json::from_value(value)?;
        if payload.is_execution_completed() {
            info!(node_id = self.base.id(), %queue_name, "received sentinel from queue");
        } else {
            debug!(node_id = self.base.id(), %queue_name, "popped payload from queue");
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::super::queue_writer;
    use super::*;
    use crate::payload::NodeConfig;
    use serde_json::json;

    fn with_queue(id: &str, node_type: &str, queue: &str) -> NodeConfig {
        let mut config = NodeConfig::new(id, node_type);
        config.data.config = json!({ "queue_name": queue })
            .as_object()
            .cloned()
            .unwrap();
        config
    }

    #[tokio::test]
    async fn writer_push_is_observed_by_reader_pop() {
        let writer =
            queue_writer::create(with_queue("w1", queue_writer::IDENTIFIER, "queue_pair_test"))
                .unwrap();
        let reader = create(with_queue("r1", IDENTIFIER, "queue_pair_test")).unwrap();

        let mut payload = NodeOutput::empty();
        payload.data.insert("k".into(), json!("v"));
        writer.execute(payload.clone()).await.unwrap();

        let popped = reader.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(popped.id, payload.id);
        assert_eq!(popped.data["k"], "v");
    }

    #[tokio::test]
    async fn writer_cleanup_forwards_sentinel() {
        let writer = queue_writer::create(with_queue(
            "w2",
            queue_writer::IDENTIFIER,
            "queue_sentinel_test",
        ))
        .unwrap();
        let reader = create(with_queue("r2", IDENTIFIER, "queue_sentinel_test")).unwrap();

        writer.cleanup(None).await.unwrap();
        let popped = reader.execute(NodeOutput::empty()).await.unwrap();
        assert!(popped.is_execution_completed());
    }

    #[test]
    fn unassigned_queue_name_fails_readiness() {
        let reader = create(NodeConfig::new("r3", IDENTIFIER)).unwrap();
        assert!(reader.is_ready().is_err());
    }
}
