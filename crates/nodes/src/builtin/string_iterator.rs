//! String iterator producer — one item per loop iteration.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::NodeError;
use crate::payload::{unique_output_key, ExecutionPool, NodeConfig, NodeOutput, WorkflowKind};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "string-iterator";

#[derive(Default)]
struct IteratorState {
    items: Vec<String>,
    index: usize,
}

/// Splits `data_content` by the configured separator at setup and emits
/// one trimmed item per iteration; the sentinel follows the last item.
pub struct StringIteratorNode {
    base: NodeBase,
    state: Mutex<IteratorState>,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(StringIteratorNode {
        base: NodeBase::new(config),
        state: Mutex::new(IteratorState::default()),
    }))
}

impl StringIteratorNode {
    fn delimiter(&self) -> String {
        let separator_type = self
            .base
            .form_str("separator_type")
            .unwrap_or_else(|| "newline".to_owned());
        match separator_type.as_str() {
            "comma" => ",".to_owned(),
            "custom" => self
                .base
                .form_str("custom_separator")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "\n".to_owned()),
            _ => "\n".to_owned(),
        }
    }
}

#[async_trait]
impl WorkflowNode for StringIteratorNode {
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
        &[WorkflowKind::Production]
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("data_content") {
            Some(content) if !content.trim().is_empty() => Ok(()),
            _ => Err(vec!["data_content is required".to_owned()]),
        }
    }

    async fn setup(&self) -> Result<(), NodeError> {
        let raw = self.base.form_str("data_content").unwrap_or_default();
        let delimiter = self.delimiter();
        let items: Vec<String> = raw
            .split(&delimiter)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect();

        info!(node_id = self.base.id(), item_count = items.len(), "string iterator initialized");
        *self.state.lock().expect("iterator state lock poisoned") =
            IteratorState { items, index: 0 };
        Ok(())
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let (item, index) = {
            let mut state = self.state.lock().expect("iterator state lock poisoned");
            if state.index >= state.items.len() {
                info!(node_id = self.base.id(), total = state.items.len(), "iteration finished");
                let mut data = serde_json::Map::new();
                data.insert("value".to_owned(), json!("Iteration completed"));
                return Ok(NodeOutput::completed(input.id, data));
            }
            let item = state.items[state.index].clone();
            state.index += 1;
            (item, state.index)
        };

        let output_key = unique_output_key(&input.data, "string_iterator");
        input.data.insert(
            output_key,
            json!({ "value": item, "iteration_index": index }),
        );
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterator(content: &str, separator: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("s1", IDENTIFIER);
        config.data.form = json!({ "data_content": content, "separator_type": separator })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn emits_trimmed_items_then_sentinel() {
        let node = iterator("a, b , c", "comma");
        node.setup().await.unwrap();

        let first = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(first.data["string_iterator"]["value"], "a");
        let second = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(second.data["string_iterator"]["value"], "b");
        let third = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(third.data["string_iterator"]["value"], "c");

        let done = node.execute(NodeOutput::empty()).await.unwrap();
        assert!(done.is_execution_completed());
    }

    #[tokio::test]
    async fn setup_resets_the_cursor() {
        let node = iterator("x", "newline");
        node.setup().await.unwrap();
        node.execute(NodeOutput::empty()).await.unwrap();
        node.setup().await.unwrap();

        let again = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(again.data["string_iterator"]["value"], "x");
    }
}
