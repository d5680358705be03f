//! Readiness validation across the graph (or a scoped subset).

use std::collections::HashSet;

use tracing::{error, info};

use crate::error::EngineError;
use crate::graph::FlowGraph;
use crate::postprocess::PostProcess;

/// Calls `is_ready` on every node and aggregates the failures into one
/// error naming each offending node with its error list. Nodes that pass
/// are marked validated so their async `init` skips re-validation.
pub struct NodeValidator;

impl PostProcess for NodeValidator {
    fn name(&self) -> &'static str {
        "node_validator"
    }

    fn run(&self, graph: &FlowGraph, scope: Option<&HashSet<String>>) -> Result<(), EngineError> {
        let node_ids: Vec<&str> = match scope {
            Some(scope) => {
                info!(scope_count = scope.len(), "validating scoped subset of nodes");
                graph.node_ids().filter(|id| scope.contains(*id)).collect()
            }
            None => {
                info!("validating all nodes in workflow");
                graph.node_ids().collect()
            }
        };

        let mut failed: Vec<String> = Vec::new();
        for node_id in node_ids {
            let Some(flow_node) = graph.get(node_id) else {
                continue;
            };
            match flow_node.instance.is_ready() {
                Ok(()) => flow_node.instance.base().mark_validated(),
                Err(errors) => failed.push(format!("node '{node_id}': {errors:?}")),
            }
        }

        if !failed.is_empty() {
            let report = failed.join("\n");
            error!(%report, "workflow validation failed");
            return Err(EngineError::ValidationFailed { report });
        }

        info!("all nodes validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FlowBuilder, WorkflowDefinition};
    use nodes::NodeRegistry;
    use serde_json::json;

    fn build(value: serde_json::Value) -> FlowGraph {
        let registry = NodeRegistry::builtin();
        let definition: WorkflowDefinition = serde_json::from_value(value).unwrap();
        FlowBuilder::new(&registry).build(definition).unwrap()
    }

    #[test]
    fn aggregates_every_failing_node_into_one_error() {
        // Both conditionals are missing their expression.
        let graph = build(json!({
            "nodes": [
                { "id": "if1", "type": "if-condition" },
                { "id": "if2", "type": "if-condition" }
            ],
            "edges": []
        }));

        let err = NodeValidator.run(&graph, None).unwrap_err();
        match err {
            EngineError::ValidationFailed { report } => {
                assert!(report.contains("if1"));
                assert!(report.contains("if2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn passing_nodes_are_marked_validated() {
        let graph = build(json!({
            "nodes": [ {
                "id": "c1",
                "type": "counter",
                "data": { "form": { "min_value": 0, "max_value": 1 }, "config": {} }
            } ],
            "edges": []
        }));

        assert!(!graph.instance("c1").unwrap().base().is_validated());
        NodeValidator.run(&graph, None).unwrap();
        assert!(graph.instance("c1").unwrap().base().is_validated());
    }

    #[test]
    fn scoped_validation_skips_nodes_outside_the_scope() {
        let graph = build(json!({
            "nodes": [
                { "id": "bad", "type": "if-condition" },
                {
                    "id": "ok",
                    "type": "counter",
                    "data": { "form": { "min_value": 0, "max_value": 1 }, "config": {} }
                }
            ],
            "edges": []
        }));

        let scope: HashSet<String> = ["ok".to_owned()].into();
        NodeValidator.run(&graph, Some(&scope)).unwrap();
        assert!(graph.instance("ok").unwrap().base().is_validated());
        assert!(!graph.instance("bad").unwrap().base().is_validated());
    }
}
