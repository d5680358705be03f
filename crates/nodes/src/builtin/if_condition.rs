//! Conditional branching on a boolean expression.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::error::NodeError;
use crate::payload::{ExecutionPool, NodeConfig, NodeOutput};
use crate::template;
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "if-condition";

/// Evaluates `condition_expression` against the incoming data and routes
/// the payload down the "yes" or "no" branch. The chosen route is also
/// appended under `data.if_condition` for observability.
pub struct IfConditionNode {
    base: NodeBase,
    result: Mutex<Option<bool>>,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(IfConditionNode {
        base: NodeBase::new(config),
        result: Mutex::new(None),
    }))
}

#[async_trait]
impl WorkflowNode for IfConditionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        match self.base.form_str("condition_expression") {
            Some(expr) if !expr.trim().is_empty() => Ok(()),
            _ => Err(vec!["condition_expression is required".to_owned()]),
        }
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let expression = self
            .base
            .form_str("condition_expression")
            .unwrap_or_default();

        let result = if expression.trim().is_empty() {
            warn!(node_id = self.base.id(), "empty condition expression, routing to 'no'");
            false
        } else {
            template::eval_bool(&expression, &input.data).map_err(|e| {
                NodeError::InvalidField {
                    field: "condition_expression",
                    reason: format!("failed to evaluate '{expression}': {e}"),
                }
            })?
        };

        info!(node_id = self.base.id(), %expression, result, "evaluated condition");
        *self.result.lock().expect("route lock poisoned") = Some(result);

        input.data.insert(
            "if_condition".to_owned(),
            json!({
                "route": if result { "yes" } else { "no" },
                "expression": expression,
                "result": result,
            }),
        );
        Ok(input)
    }

    fn route(&self) -> Option<&'static str> {
        self.result
            .lock()
            .expect("route lock poisoned")
            .map(|yes| if yes { "yes" } else { "no" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(expr: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("if1", IDENTIFIER);
        config.data.form = json!({ "condition_expression": expr })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test]
    async fn routes_yes_when_expression_holds() {
        let node = condition("data.counter.current > 2");
        let mut input = NodeOutput::empty();
        input
            .data
            .insert("counter".into(), json!({ "current": 3 }));

        let output = node.execute(input).await.unwrap();
        assert_eq!(node.route(), Some("yes"));
        assert_eq!(output.data["if_condition"]["route"], "yes");
        assert_eq!(output.data["if_condition"]["result"], true);
    }

    #[tokio::test]
    async fn routes_no_when_expression_fails() {
        let node = condition("data.counter.current > 2");
        let mut input = NodeOutput::empty();
        input
            .data
            .insert("counter".into(), json!({ "current": 1 }));

        node.execute(input).await.unwrap();
        assert_eq!(node.route(), Some("no"));
    }

    #[tokio::test]
    async fn bad_expression_is_an_error() {
        let node = condition("data.(");
        let err = node.execute(NodeOutput::empty()).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidField { .. }));
    }

    #[test]
    fn missing_expression_fails_readiness() {
        let node = create(NodeConfig::new("if2", IDENTIFIER)).unwrap();
        assert!(node.is_ready().is_err());
    }
}
