//! Translates external workflow JSON into a flow graph.
//!
//! Shape: `{ nodes: [{id, type, data:{form, config}}…],
//! edges: [{source, target, sourceHandle?}…], env?: {…} }`.
//! Edge `sourceHandle` is the branch-key label before normalization.

use std::collections::{HashMap, HashSet, VecDeque};

use nodes::{DataMap, NodeConfig, NodeRegistry};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::graph::FlowGraph;

// ---------------------------------------------------------------------------
// External definition shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
    /// Branch label on the source side ("Yes"/"No" or absent).
    #[serde(default, rename = "sourceHandle")]
    pub source_handle: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub env: DataMap,
}

/// Lowercase the source-handle label; empty/null becomes "default".
pub fn normalize_branch_key(source_handle: Option<&str>) -> String {
    match source_handle {
        Some(handle) if !handle.trim().is_empty() => handle.trim().to_lowercase(),
        _ => "default".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// FlowBuilder
// ---------------------------------------------------------------------------

/// Builds a [`FlowGraph`] from a [`WorkflowDefinition`] using the node
/// registry. Node instantiation failures abort the build; edges that
/// reference unknown ids are skipped with a warning.
pub struct FlowBuilder<'a> {
    registry: &'a NodeRegistry,
}

impl<'a> FlowBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn build(&self, definition: WorkflowDefinition) -> Result<FlowGraph, EngineError> {
        info!(
            node_count = definition.nodes.len(),
            edge_count = definition.edges.len(),
            "loading workflow"
        );

        let mut graph = FlowGraph::new();
        for node_config in definition.nodes {
            let instance = self.registry.create(node_config)?;
            graph.add_node(instance)?;
        }

        for edge in &definition.edges {
            let key = normalize_branch_key(edge.source_handle.as_deref());
            match graph.connect(&edge.source, &edge.target, &key) {
                Ok(()) => {}
                Err(EngineError::UnknownNodeReference { node_id, side }) => {
                    warn!(
                        source = %edge.source,
                        target = %edge.target,
                        %node_id,
                        side,
                        "skipping connection to unknown node"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        detect_cycles(&graph)?;
        graph.set_env(definition.env);
        Ok(graph)
    }
}

/// Kahn's algorithm over the built graph; errors when a cycle remains.
fn detect_cycles(graph: &FlowGraph) -> Result<(), EngineError> {
    let mut in_degree: HashMap<&str, usize> =
        graph.node_ids().map(|id| (id, 0usize)).collect();
    for id in graph.node_ids() {
        if let Some(node) = graph.get(id) {
            for child in node.all_children() {
                *in_degree.entry(child).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(id) = queue.pop_front() {
        visited.insert(id);
        if let Some(node) = graph.get(id) {
            for child in node.all_children() {
                let deg = in_degree.entry(child).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if visited.len() != graph.len() {
        return Err(EngineError::CycleDetected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> WorkflowDefinition {
        serde_json::from_value(value).expect("definition should deserialize")
    }

    fn counter_node(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": "counter",
            "data": { "form": { "min_value": 0, "max_value": 3 }, "config": {} }
        })
    }

    #[test]
    fn branch_keys_normalize_to_lowercase_default() {
        assert_eq!(normalize_branch_key(None), "default");
        assert_eq!(normalize_branch_key(Some("")), "default");
        assert_eq!(normalize_branch_key(Some("Yes")), "yes");
        assert_eq!(normalize_branch_key(Some("NO")), "no");
        assert_eq!(normalize_branch_key(Some("subDAG")), "subdag");
    }

    #[test]
    fn builds_nodes_and_edges_from_json() {
        let registry = NodeRegistry::builtin();
        let definition = definition(json!({
            "nodes": [
                counter_node("c1"),
                {
                    "id": "t1",
                    "type": "data-transformer",
                    "data": { "form": { "output_template": "{}" }, "config": {} }
                }
            ],
            "edges": [ { "source": "c1", "target": "t1" } ],
            "env": { "region": "eu" }
        }));

        let graph = FlowBuilder::new(&registry).build(definition).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("c1").unwrap().children("default"), ["t1"]);
        assert_eq!(graph.env()["region"], "eu");
    }

    #[test]
    fn unknown_node_type_aborts_the_build() {
        let registry = NodeRegistry::builtin();
        let definition = definition(json!({
            "nodes": [ { "id": "x", "type": "does-not-exist" } ],
            "edges": []
        }));
        assert!(matches!(
            FlowBuilder::new(&registry).build(definition),
            Err(EngineError::Build(_))
        ));
    }

    #[test]
    fn edges_to_unknown_nodes_are_skipped() {
        let registry = NodeRegistry::builtin();
        let definition = definition(json!({
            "nodes": [ counter_node("c1") ],
            "edges": [ { "source": "c1", "target": "ghost" } ]
        }));

        let graph = FlowBuilder::new(&registry).build(definition).unwrap();
        assert!(graph.get("c1").unwrap().children("default").is_empty());
    }

    #[test]
    fn cycles_are_rejected() {
        let registry = NodeRegistry::builtin();
        let definition = definition(json!({
            "nodes": [
                {
                    "id": "a",
                    "type": "data-transformer",
                    "data": { "form": { "output_template": "{}" }, "config": {} }
                },
                {
                    "id": "b",
                    "type": "data-transformer",
                    "data": { "form": { "output_template": "{}" }, "config": {} }
                }
            ],
            "edges": [
                { "source": "a", "target": "b" },
                { "source": "b", "target": "a" }
            ]
        }));
        assert!(matches!(
            FlowBuilder::new(&registry).build(definition),
            Err(EngineError::CycleDetected)
        ));
    }
}
