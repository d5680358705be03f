//! File writer — terminal sink appending payload data to a file.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::NodeError;
use crate::payload::{ExecutionPool, NodeConfig, NodeOutput};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "file-writer";

/// Appends each payload's data as one JSON line to the configured path.
pub struct FileWriterNode {
    base: NodeBase,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(FileWriterNode {
        base: NodeBase::new(config),
    }))
}

#[async_trait]
impl WorkflowNode for FileWriterNode {
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
        ExecutionPool::Thread
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("path") {
            Some(path) if !path.trim().is_empty() => Ok(()),
            _ => Err(vec!["path is required".to_owned()]),
        }
    }

    async fn execute(&self, input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let path = self.base.require_form_str("path")?;
        let mut line = serde_json::to_string(&input.data)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        debug!(node_id = self.base.id(), %path, "appended payload to file");
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_one_json_line_per_payload() {
        let dir = std::env::temp_dir().join(format!("file_writer_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.jsonl");

        let mut config = NodeConfig::new("f1", IDENTIFIER);
        config.data.form = json!({ "path": path.to_string_lossy() })
            .as_object()
            .cloned()
            .unwrap();
        let node = create(config).unwrap();

        let mut input = NodeOutput::empty();
        input.data.insert("k".into(), json!(1));
        node.execute(input.clone()).await.unwrap();
        node.execute(input).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
