//! In-memory flow graph: nodes keyed by id, per-node branch map.
//!
//! A [`FlowNode`] holds the live node instance and a map from branch key
//! ("default", "yes", "no", "subdag") to the ids of its children; several
//! children may share a key (fan-out). The graph owns its nodes
//! exclusively — runners traverse by id and borrow the instances.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use nodes::{DataMap, WorkflowNode};
use tracing::debug;

use crate::error::EngineError;

/// Graph-level wrapper around a node instance.
pub struct FlowNode {
    pub id: String,
    pub instance: Arc<dyn WorkflowNode>,
    /// Branch key → child node ids, in edge insertion order per key.
    pub next: BTreeMap<String, Vec<String>>,
}

impl FlowNode {
    pub fn new(instance: Arc<dyn WorkflowNode>) -> Self {
        Self {
            id: instance.base().id().to_owned(),
            instance,
            next: BTreeMap::new(),
        }
    }

    fn add_next(&mut self, child_id: String, key: String) -> Result<(), EngineError> {
        let children = self.next.entry(key.clone()).or_default();
        if children.contains(&child_id) {
            return Err(EngineError::DuplicateEdge {
                from: self.id.clone(),
                to: child_id,
                key,
            });
        }
        children.push(child_id);
        Ok(())
    }

    /// Children on one branch key.
    pub fn children(&self, key: &str) -> &[String] {
        self.next.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All children across every branch key.
    pub fn all_children(&self) -> Vec<&str> {
        self.next
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// The workflow DAG. Built once, immutable during execution.
#[derive(Default)]
pub struct FlowGraph {
    nodes: HashMap<String, FlowNode>,
    /// Node ids in insertion order, for deterministic iteration.
    order: Vec<String>,
    workflow_env: DataMap,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, instance: Arc<dyn WorkflowNode>) -> Result<(), EngineError> {
        let flow_node = FlowNode::new(instance);
        if self.nodes.contains_key(&flow_node.id) {
            return Err(EngineError::DuplicateNodeId(flow_node.id));
        }
        debug!(
            node_id = %flow_node.id,
            node_type = flow_node.instance.node_type(),
            kind = flow_node.instance.kind().as_str(),
            "flow node added to graph"
        );
        self.order.push(flow_node.id.clone());
        self.nodes.insert(flow_node.id.clone(), flow_node);
        Ok(())
    }

    /// Connect two existing nodes on a branch key.
    pub fn connect(&mut self, from_id: &str, to_id: &str, key: &str) -> Result<(), EngineError> {
        if !self.nodes.contains_key(from_id) {
            return Err(EngineError::UnknownNodeReference {
                node_id: from_id.to_owned(),
                side: "source",
            });
        }
        if !self.nodes.contains_key(to_id) {
            return Err(EngineError::UnknownNodeReference {
                node_id: to_id.to_owned(),
                side: "target",
            });
        }
        if from_id == to_id {
            return Err(EngineError::SelfReference(from_id.to_owned()));
        }

        let from = self
            .nodes
            .get_mut(from_id)
            .ok_or_else(|| EngineError::NodeNotFound(from_id.to_owned()))?;
        from.add_next(to_id.to_owned(), key.to_owned())?;
        debug!(from_id, to_id, key, "connected nodes");
        Ok(())
    }

    pub fn get(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.get(node_id)
    }

    pub fn instance(&self, node_id: &str) -> Option<Arc<dyn WorkflowNode>> {
        self.nodes.get(node_id).map(|n| n.instance.clone())
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes with an edge into `node_id`.
    pub fn upstream_ids(&self, node_id: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes[*id]
                    .next
                    .values()
                    .any(|children| children.iter().any(|c| c == node_id))
            })
            .map(String::as_str)
            .collect()
    }

    /// Every node reachable from `start_id`, including the start itself.
    pub fn reachable_from(&self, start_id: &str) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        if self.nodes.contains_key(start_id) {
            visited.insert(start_id.to_owned());
            queue.push_back(start_id.to_owned());
        }
        while let Some(id) = queue.pop_front() {
            for child in self.nodes[&id].all_children() {
                if visited.insert(child.to_owned()) {
                    queue.push_back(child.to_owned());
                }
            }
        }
        visited
    }

    pub fn set_env(&mut self, env: DataMap) {
        self.workflow_env = env;
    }

    pub fn env(&self) -> &DataMap {
        &self.workflow_env
    }
}
