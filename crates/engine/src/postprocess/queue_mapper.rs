//! Automatic queue-name assignment for writer/reader pairs.

use std::collections::HashSet;

use nodes::QueueRole;
use serde_json::json;
use tracing::info;

use crate::error::EngineError;
use crate::graph::FlowGraph;
use crate::postprocess::PostProcess;

/// Assigns `queue_{writerId}_{readerId}` to every connected queue
/// writer/reader pair so users never coordinate queue names by hand.
/// Endpoints that already carry a non-default name are left alone, which
/// also makes the pass idempotent.
///
/// A writer feeding several readers receives one name per pair in edge
/// order, so only the last pair's queue is actually written; a single
/// reader per writer is the supported topology.
pub struct QueueMapper;

fn generate_queue_name(source_id: &str, target_id: &str) -> String {
    format!("queue_{source_id}_{target_id}")
}

fn assign_if_unset(node: &dyn nodes::WorkflowNode, queue_name: &str) {
    let current = node.base().config_str("queue_name");
    if current.is_none() || current.as_deref() == Some("default") {
        node.base().set_config_value("queue_name", json!(queue_name));
    }
}

impl PostProcess for QueueMapper {
    fn name(&self) -> &'static str {
        "queue_mapper"
    }

    fn run(&self, graph: &FlowGraph, _scope: Option<&HashSet<String>>) -> Result<(), EngineError> {
        let mut mapped = 0usize;

        for node_id in graph.node_ids() {
            let Some(flow_node) = graph.get(node_id) else {
                continue;
            };
            if flow_node.instance.queue_role() != Some(QueueRole::Writer) {
                continue;
            }

            for children in flow_node.next.values() {
                for child_id in children {
                    let Some(child) = graph.get(child_id) else {
                        continue;
                    };
                    if child.instance.queue_role() != Some(QueueRole::Reader) {
                        continue;
                    }

                    let queue_name = generate_queue_name(node_id, child_id);
                    assign_if_unset(flow_node.instance.as_ref(), &queue_name);
                    assign_if_unset(child.instance.as_ref(), &queue_name);
                    mapped += 1;
                    info!(
                        %queue_name,
                        writer = node_id,
                        reader = child_id.as_str(),
                        "auto-assigned queue name"
                    );
                }
            }
        }

        info!(mapped, "queue mapping completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{FlowBuilder, WorkflowDefinition};
    use nodes::NodeRegistry;
    use serde_json::json;

    fn pair_graph(writer_config: serde_json::Value) -> FlowGraph {
        let registry = NodeRegistry::builtin();
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [
                { "id": "w1", "type": "queue-writer", "data": { "form": {}, "config": writer_config } },
                { "id": "r1", "type": "queue-reader" }
            ],
            "edges": [ { "source": "w1", "target": "r1" } ]
        }))
        .unwrap();
        FlowBuilder::new(&registry).build(definition).unwrap()
    }

    fn queue_name(graph: &FlowGraph, id: &str) -> Option<String> {
        graph.instance(id).unwrap().base().config_str("queue_name")
    }

    #[test]
    fn assigns_pair_name_to_both_endpoints() {
        let graph = pair_graph(json!({}));
        QueueMapper.run(&graph, None).unwrap();
        assert_eq!(queue_name(&graph, "w1").as_deref(), Some("queue_w1_r1"));
        assert_eq!(queue_name(&graph, "r1").as_deref(), Some("queue_w1_r1"));
    }

    #[test]
    fn user_supplied_name_is_kept() {
        let graph = pair_graph(json!({ "queue_name": "my_queue" }));
        QueueMapper.run(&graph, None).unwrap();
        assert_eq!(queue_name(&graph, "w1").as_deref(), Some("my_queue"));
        // The reader had no name, so it still gets the generated one.
        assert_eq!(queue_name(&graph, "r1").as_deref(), Some("queue_w1_r1"));
    }

    #[test]
    fn mapping_an_already_mapped_graph_is_a_no_op() {
        let graph = pair_graph(json!({}));
        QueueMapper.run(&graph, None).unwrap();
        let before = (queue_name(&graph, "w1"), queue_name(&graph, "r1"));
        QueueMapper.run(&graph, None).unwrap();
        assert_eq!(before, (queue_name(&graph, "w1"), queue_name(&graph, "r1")));
    }
}
