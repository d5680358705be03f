//! Shared execution context for the runners.
//!
//! Both the production runner and the API runner walk the same graph with
//! the same dispatch mechanics: emit `node_started`, run the node on its
//! pool, emit `node_completed` (with the route for conditionals) or
//! `node_failed`, and pick the branch keys the output should follow. The
//! differing policies — retry-forever vs. re-raise, spawned sinks vs.
//! strictly sequential — live in the runners themselves.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use nodes::{DataMap, NodeKind, NodeOutput};
use tracing::{debug, info};

use crate::analyzer::FlowAnalyzer;
use crate::error::EngineError;
use crate::events::EventEmitter;
use crate::execution::pool::PoolExecutor;
use crate::graph::{FlowGraph, FlowNode};

/// Mutable map shared by every runner of an engine, surfaced to nodes
/// through payload metadata.
pub type SharedRuntime = Arc<Mutex<DataMap>>;

#[derive(Clone)]
pub struct ExecContext {
    pub graph: Arc<FlowGraph>,
    pub executor: Arc<PoolExecutor>,
    pub events: EventEmitter,
    pub runtime: SharedRuntime,
}

impl ExecContext {
    pub fn new(
        graph: Arc<FlowGraph>,
        executor: Arc<PoolExecutor>,
        events: EventEmitter,
        runtime: SharedRuntime,
    ) -> Self {
        Self {
            graph,
            executor,
            events,
            runtime,
        }
    }

    pub fn node(&self, node_id: &str) -> Result<&FlowNode, EngineError> {
        self.graph
            .get(node_id)
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_owned()))
    }

    /// Dispatch one payload to one node, with events around it.
    pub async fn run_node(
        &self,
        flow_node: &FlowNode,
        input: NodeOutput,
    ) -> Result<NodeOutput, EngineError> {
        let instance = flow_node.instance.clone();
        let node_type = instance.node_type();

        self.events.emit_node_started(&flow_node.id, node_type);
        info!(
            node_id = %flow_node.id,
            node_type,
            kind = instance.kind().as_str(),
            "initiating node execution"
        );

        match self.executor.dispatch(instance.clone(), input).await {
            Ok(output) => {
                // A sentinel delivery ran cleanup, not the body; a stale
                // route from the previous run must not be re-reported.
                let route = match instance.kind() {
                    NodeKind::Conditional if !output.is_execution_completed() => {
                        instance.route().map(str::to_owned)
                    }
                    _ => None,
                };
                self.events.emit_node_completed(
                    &flow_node.id,
                    node_type,
                    Some(output.data.clone()),
                    route,
                );
                debug!(node_id = %flow_node.id, node_type, "node execution completed");
                Ok(output)
            }
            Err(source) => {
                self.events
                    .emit_node_failed(&flow_node.id, node_type, &source.to_string());
                Err(EngineError::Node {
                    node_id: flow_node.id.clone(),
                    source,
                })
            }
        }
    }

    /// The branch keys an output should follow from this node.
    ///
    /// The sentinel broadcasts to every branch; a conditional follows its
    /// chosen route; everything else follows "default".
    pub fn select_branch_keys(&self, flow_node: &FlowNode, output: &NodeOutput) -> Vec<String> {
        if output.is_execution_completed() {
            return flow_node.next.keys().cloned().collect();
        }
        if flow_node.instance.kind() == NodeKind::Conditional {
            return flow_node
                .instance
                .route()
                .map(|route| vec![route.to_owned()])
                .unwrap_or_default();
        }
        vec!["default".to_owned()]
    }

    /// Child ids selected by an output, in branch-key then edge order.
    pub fn selected_children(&self, flow_node: &FlowNode, output: &NodeOutput) -> Vec<String> {
        self.select_branch_keys(flow_node, output)
            .iter()
            .flat_map(|key| flow_node.children(key))
            .cloned()
            .collect()
    }

    /// Call `init` on `start_id` and every node reachable from it, each
    /// at most once.
    pub async fn init_reachable(&self, start_id: &str) -> Result<(), EngineError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![start_id.to_owned()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let flow_node = self.node(&id)?;
            flow_node
                .instance
                .init()
                .await
                .map_err(|source| EngineError::Node {
                    node_id: id.clone(),
                    source,
                })?;
            stack.extend(flow_node.all_children().iter().map(|c| c.to_string()));
        }
        Ok(())
    }

    /// The join node downstream of a fork, if the branches rejoin.
    pub fn find_join(&self, branch_roots: &[String]) -> Option<String> {
        FlowAnalyzer::new(&self.graph).find_join(branch_roots)
    }

    /// Walk one fork branch until the join node (exclusive), returning
    /// the branch's terminal output.
    ///
    /// Branches are single chains for join purposes: conditional routes
    /// are honored, a non-blocking node terminates its branch, and when a
    /// branch fans out again only the first child is followed.
    pub async fn run_branch_until_join(
        &self,
        root_id: &str,
        mut payload: NodeOutput,
        join_id: &str,
    ) -> Result<NodeOutput, EngineError> {
        let mut current_id = root_id.to_owned();
        loop {
            let flow_node = self.node(&current_id)?;
            payload = self.run_node(flow_node, payload).await?;

            if flow_node.instance.kind() == NodeKind::NonBlocking {
                return Ok(payload);
            }

            let next_ids = self.selected_children(flow_node, &payload);
            if next_ids.is_empty() || next_ids.iter().any(|id| id == join_id) {
                return Ok(payload);
            }
            current_id = next_ids[0].clone();
        }
    }
}
