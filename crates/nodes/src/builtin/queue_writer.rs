//! Queue writer — terminal sink pushing payloads onto a queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::payload::{ExecutionPool, NodeConfig, NodeOutput};
use crate::traits::{NodeBase, NodeKind, QueueRole, WorkflowNode};

pub const IDENTIFIER: &str = "queue-writer";

/// Non-blocking sink that JSON-pushes every payload to the queue named by
/// `config.queue_name` (usually assigned by the queue-mapping pass).
/// On cleanup the sentinel is forwarded into the queue so the reading
/// side terminates too.
pub struct QueueWriterNode {
    base: NodeBase,
    store: storage::DataStore,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(QueueWriterNode {
        base: NodeBase::new(config),
        store: storage::DataStore::shared(),
    }))
}

impl QueueWriterNode {
    fn queue_name(&self) -> Result<String, NodeError> {
        self.base
            .config_str("queue_name")
            .filter(|name| !name.is_empty() && name != "default")
            .ok_or(NodeError::MissingField { field: "queue_name" })
    }
}

#[async_trait]
impl WorkflowNode for QueueWriterNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::NonBlocking
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn queue_role(&self) -> Option<QueueRole> {
        Some(QueueRole::Writer)
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.queue_name() {
            Ok(_) => Ok(()),
            Err(_) => Err(vec![
                "queue_name is not assigned; connect this writer to a queue reader".to_owned(),
            ]),
        }
    }

    async fn execute(&self, input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let queue_name = self.queue_name()?;
        let value = serde_json::to_value(&input)?;
        self.store.queue().push(&queue_name, &value)?;
        debug!(node_id = self.base.id(), %queue_name, "pushed payload to queue");
        Ok(input)
    }

    async fn cleanup(&self, input: Option<&NodeOutput>) -> Result<(), NodeError> {
        // Forward the sentinel so the paired reader also terminates.
        let sentinel = match input {
            Some(payload) if payload.is_execution_completed() => payload.clone(),
            _ => NodeOutput::completed(uuid::Uuid::new_v4(), Default::default()),
        };
        match self.queue_name() {
            Ok(queue_name) => {
                self.store
                    .queue()
                    .push(&queue_name, &serde_json::to_value(&sentinel)?)?;
                debug!(node_id = self.base.id(), %queue_name, "forwarded sentinel to queue");
            }
            Err(_) => warn!(node_id = self.base.id(), "no queue name at cleanup"),
        }
        Ok(())
    }
}
