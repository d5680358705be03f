//! Graph queries: producers, first node, reachability, join detection.

use std::collections::{HashSet, VecDeque};

use nodes::NodeKind;

use crate::graph::FlowGraph;

/// Read-only traversal and analysis over a built graph.
pub struct FlowAnalyzer<'a> {
    graph: &'a FlowGraph,
}

impl<'a> FlowAnalyzer<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self { graph }
    }

    /// Ids of all producer nodes, in insertion order.
    pub fn producer_ids(&self) -> Vec<String> {
        self.graph
            .node_ids()
            .filter(|id| {
                self.graph
                    .get(id)
                    .is_some_and(|n| n.instance.kind() == NodeKind::Producer)
            })
            .map(str::to_owned)
            .collect()
    }

    /// The entry node: the first node without incoming edges, falling back
    /// to the first producer, then to the first node added.
    pub fn first_node_id(&self) -> Option<String> {
        if self.graph.is_empty() {
            return None;
        }

        let mut has_incoming: HashSet<&str> = HashSet::new();
        for id in self.graph.node_ids() {
            if let Some(node) = self.graph.get(id) {
                has_incoming.extend(node.all_children());
            }
        }

        if let Some(root) = self.graph.node_ids().find(|id| !has_incoming.contains(id)) {
            return Some(root.to_owned());
        }
        if let Some(producer) = self.producer_ids().into_iter().next() {
            return Some(producer);
        }
        self.graph.node_ids().next().map(str::to_owned)
    }

    /// The join node of a fork: the nearest node reachable from two or
    /// more of the branch roots. `None` when the branches never rejoin.
    pub fn find_join(&self, branch_roots: &[String]) -> Option<String> {
        if branch_roots.len() < 2 {
            return None;
        }

        let reachable_sets: Vec<HashSet<String>> = branch_roots
            .iter()
            .map(|root| self.graph.reachable_from(root))
            .collect();

        // Multi-source BFS so the first qualifying node popped is the
        // closest one; child order makes the result deterministic.
        let mut visited: HashSet<String> = branch_roots.iter().cloned().collect();
        let mut queue: VecDeque<String> = branch_roots.to_vec().into();

        while let Some(id) = queue.pop_front() {
            let membership = reachable_sets.iter().filter(|set| set.contains(&id)).count();
            if membership >= 2 {
                return Some(id);
            }
            if let Some(node) = self.graph.get(&id) {
                for child in node.all_children() {
                    if visited.insert(child.to_owned()) {
                        queue.push_back(child.to_owned());
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowGraph;
    use nodes::mock::MockNode;
    use serde_json::json;

    fn add(graph: &mut FlowGraph, id: &str, kind: NodeKind) {
        graph
            .add_node(MockNode::returning(id, kind, json!({})))
            .unwrap();
    }

    #[test]
    fn first_node_prefers_roots_then_producers() {
        let mut graph = FlowGraph::new();
        add(&mut graph, "mid", NodeKind::Blocking);
        add(&mut graph, "root", NodeKind::Producer);
        graph.connect("root", "mid", "default").unwrap();

        let analyzer = FlowAnalyzer::new(&graph);
        assert_eq!(analyzer.first_node_id().as_deref(), Some("root"));
        assert_eq!(analyzer.producer_ids(), ["root"]);
    }

    #[test]
    fn empty_graph_has_no_first_node() {
        let graph = FlowGraph::new();
        assert_eq!(FlowAnalyzer::new(&graph).first_node_id(), None);
    }

    #[test]
    fn join_of_a_diamond_is_found() {
        let mut graph = FlowGraph::new();
        for id in ["p", "x", "y", "j", "after"] {
            add(&mut graph, id, NodeKind::Blocking);
        }
        graph.connect("p", "x", "default").unwrap();
        graph.connect("p", "y", "default").unwrap();
        graph.connect("x", "j", "default").unwrap();
        graph.connect("y", "j", "default").unwrap();
        graph.connect("j", "after", "default").unwrap();

        let analyzer = FlowAnalyzer::new(&graph);
        let join = analyzer.find_join(&["x".to_owned(), "y".to_owned()]);
        assert_eq!(join.as_deref(), Some("j"));
    }

    #[test]
    fn independent_branches_have_no_join() {
        let mut graph = FlowGraph::new();
        for id in ["p", "x", "y"] {
            add(&mut graph, id, NodeKind::Blocking);
        }
        graph.connect("p", "x", "default").unwrap();
        graph.connect("p", "y", "default").unwrap();

        let analyzer = FlowAnalyzer::new(&graph);
        assert_eq!(analyzer.find_join(&["x".to_owned(), "y".to_owned()]), None);
    }

    #[test]
    fn uneven_depth_branches_join_at_common_descendant() {
        let mut graph = FlowGraph::new();
        for id in ["x", "a", "y", "j"] {
            add(&mut graph, id, NodeKind::Blocking);
        }
        graph.connect("x", "a", "default").unwrap();
        graph.connect("a", "j", "default").unwrap();
        graph.connect("y", "j", "default").unwrap();

        let analyzer = FlowAnalyzer::new(&graph);
        let join = analyzer.find_join(&["x".to_owned(), "y".to_owned()]);
        assert_eq!(join.as_deref(), Some("j"));
    }
}
