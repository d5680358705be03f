//! Counter producer — stateful iteration between two bounds.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::payload::{meta, unique_output_key, ExecutionPool, NodeConfig, NodeOutput, WorkflowKind};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "counter";

/// Stateful counter that iterates between `min_value` and `max_value`.
///
/// `increment` mode starts at the minimum and adds `step` each iteration;
/// `decrement` starts at the maximum and subtracts. Crossing the bound
/// produces the termination sentinel. `cleanup` resets the state.
///
/// Output under a collision-resolved `counter` key:
/// `{current, min, max, step, direction, iteration}`.
pub struct CounterNode {
    base: NodeBase,
    current: Mutex<Option<i64>>,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(CounterNode {
        base: NodeBase::new(config),
        current: Mutex::new(None),
    }))
}

impl CounterNode {
    fn direction(&self) -> String {
        self.base
            .form_str("direction")
            .unwrap_or_else(|| "increment".to_owned())
    }
}

#[async_trait]
impl WorkflowNode for CounterNode {
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
        // A stateful loop producer has no place in request/response runs.
        &[WorkflowKind::Production]
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let min = self.base.form_i64("min_value", 0);
        let max = self.base.form_i64("max_value", 10);
        if min > max {
            errors.push(format!("min_value {min} exceeds max_value {max}"));
        }
        if self.base.form_i64("step", 1) <= 0 {
            errors.push("step must be positive".to_owned());
        }
        match self.direction().as_str() {
            "increment" | "decrement" => {}
            other => errors.push(format!("direction must be increment or decrement, got '{other}'")),
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let min = self.base.form_i64("min_value", 0);
        let max = self.base.form_i64("max_value", 10);
        let step = self.base.form_i64("step", 1);
        let direction = self.direction();

        let mut current = self.current.lock().expect("counter state lock poisoned");
        let value = *current.get_or_insert(if direction == "increment" { min } else { max });

        let exhausted = if direction == "increment" { value > max } else { value < min };
        if exhausted {
            info!(node_id = self.base.id(), current = value, "counter completed");
            return Ok(NodeOutput::completed(input.id, input.data));
        }

        let iteration = self.base.execution_count() + 1;
        let output_key = unique_output_key(&input.data, "counter");
        input.data.insert(
            output_key,
            json!({
                "current": value,
                "min": min,
                "max": max,
                "step": step,
                "direction": direction,
                "iteration": iteration,
            }),
        );

        debug!(node_id = self.base.id(), current = value, iteration, "counter iteration");

        *current = Some(if direction == "increment" { value + step } else { value - step });

        input.metadata.insert(meta::SOURCE_NODE_ID.to_owned(), json!(self.base.id()));
        input.metadata.insert(meta::OPERATION.to_owned(), json!("counter"));
        Ok(input)
    }

    async fn cleanup(&self, _input: Option<&NodeOutput>) -> Result<(), NodeError> {
        *self.current.lock().expect("counter state lock poisoned") = None;
        debug!(node_id = self.base.id(), "counter reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(min: i64, max: i64) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("c1", IDENTIFIER);
        config.data.form = json!({ "min_value": min, "max_value": max, "step": 1 })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn emits_values_then_sentinel() {
        let node = counter(1, 2);
        let first = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(first.data["counter"]["current"], 1);
        node.base().bump_execution_count();

        let second = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(second.data["counter"]["current"], 2);
        node.base().bump_execution_count();

        let done = node.execute(NodeOutput::empty()).await.unwrap();
        assert!(done.is_execution_completed());
    }

    #[tokio::test]
    async fn cleanup_resets_state() {
        let node = counter(5, 5);
        let first = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(first.data["counter"]["current"], 5);

        node.cleanup(None).await.unwrap();
        let again = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(again.data["counter"]["current"], 5);
    }

    #[test]
    fn invalid_bounds_fail_readiness() {
        let node = counter(10, 1);
        let errors = node.is_ready().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("exceeds"));
    }
}
