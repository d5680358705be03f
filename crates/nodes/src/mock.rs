//! `MockNode` — a test double for `WorkflowNode`.
//!
//! Useful in unit and integration tests where a real node implementation
//! is either unavailable or irrelevant. The mock records every payload it
//! receives and plays back a scripted behaviour: merge keys into the
//! data, fail, complete with the sentinel, or route a conditional.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;
use crate::payload::{unique_output_key, DataMap, ExecutionPool, NodeConfig, NodeOutput};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Clone)]
pub enum MockBehaviour {
    /// Merge the given object's keys into the incoming data
    /// (collision-resolved, like real nodes writing their output key).
    MergeData(Value),
    /// Return the termination sentinel.
    Complete,
    /// Fail with the given message.
    Fail(String),
    /// Set the conditional route, then pass the data through.
    Route(&'static str),
}

/// A mock node that records every call and returns scripted results.
///
/// Behaviours are consumed front-to-back; the last one repeats once the
/// script is exhausted.
pub struct MockNode {
    base: NodeBase,
    kind: NodeKind,
    pool: ExecutionPool,
    script: Mutex<Vec<MockBehaviour>>,
    calls: Mutex<Vec<NodeOutput>>,
    cleanups: Mutex<Vec<Option<NodeOutput>>>,
    inits: Mutex<u32>,
    route: Mutex<Option<&'static str>>,
}

impl MockNode {
    pub fn new(id: impl Into<String>, kind: NodeKind, script: Vec<MockBehaviour>) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(NodeConfig::new(id, "mock")),
            kind,
            pool: ExecutionPool::Async,
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            inits: Mutex::new(0),
            route: Mutex::new(None),
        })
    }

    /// A node that always merges `value`'s keys into the incoming data.
    pub fn returning(id: impl Into<String>, kind: NodeKind, value: Value) -> Arc<Self> {
        Self::new(id, kind, vec![MockBehaviour::MergeData(value)])
    }

    /// A producer that merges each value in turn, then completes.
    pub fn producing(id: impl Into<String>, values: Vec<Value>) -> Arc<Self> {
        let mut script: Vec<MockBehaviour> =
            values.into_iter().map(MockBehaviour::MergeData).collect();
        script.push(MockBehaviour::Complete);
        Self::new(id, NodeKind::Producer, script)
    }

    /// A node that always fails.
    pub fn failing(id: impl Into<String>, kind: NodeKind, msg: impl Into<String>) -> Arc<Self> {
        Self::new(id, kind, vec![MockBehaviour::Fail(msg.into())])
    }

    /// A conditional that follows the scripted routes in order.
    pub fn routing(id: impl Into<String>, routes: Vec<&'static str>) -> Arc<Self> {
        Self::new(
            id,
            NodeKind::Conditional,
            routes.into_iter().map(MockBehaviour::Route).collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<NodeOutput> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.lock().unwrap().len()
    }

    pub fn init_count(&self) -> u32 {
        *self.inits.lock().unwrap()
    }

    fn next_behaviour(&self) -> MockBehaviour {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or(MockBehaviour::MergeData(Value::Null))
        }
    }
}

#[async_trait]
impl WorkflowNode for MockNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        "mock"
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn execution_pool(&self) -> ExecutionPool {
        self.pool
    }

    async fn setup(&self) -> Result<(), NodeError> {
        *self.inits.lock().unwrap() += 1;
        Ok(())
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        self.calls.lock().unwrap().push(input.clone());

        match self.next_behaviour() {
            MockBehaviour::MergeData(value) => {
                if let Value::Object(object) = value {
                    for (key, val) in object {
                        let resolved = unique_output_key(&input.data, &key);
                        input.data.insert(resolved, val);
                    }
                }
                Ok(input)
            }
            MockBehaviour::Complete => Ok(NodeOutput::completed(input.id, DataMap::new())),
            MockBehaviour::Fail(msg) => Err(NodeError::Failed(msg)),
            MockBehaviour::Route(route) => {
                *self.route.lock().unwrap() = Some(route);
                Ok(input)
            }
        }
    }

    async fn cleanup(&self, input: Option<&NodeOutput>) -> Result<(), NodeError> {
        self.cleanups.lock().unwrap().push(input.cloned());
        Ok(())
    }

    fn route(&self) -> Option<&'static str> {
        *self.route.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merge_behaviour_adds_keys_with_collision_policy() {
        let node = MockNode::returning("m1", NodeKind::Blocking, json!({ "k": 1 }));

        let first = node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(first.data["k"], 1);

        let second = node.execute(first).await.unwrap();
        assert_eq!(second.data["k"], 1);
        assert_eq!(second.data["k_2"], 1);
        assert_eq!(node.call_count(), 2);
    }

    #[tokio::test]
    async fn producing_script_ends_with_sentinel() {
        let node = MockNode::producing("p1", vec![json!({ "n": 1 }), json!({ "n": 2 })]);

        assert!(!node.execute(NodeOutput::empty()).await.unwrap().is_execution_completed());
        assert!(!node.execute(NodeOutput::empty()).await.unwrap().is_execution_completed());
        assert!(node.execute(NodeOutput::empty()).await.unwrap().is_execution_completed());
        // Exhausted script repeats its last behaviour.
        assert!(node.execute(NodeOutput::empty()).await.unwrap().is_execution_completed());
    }

    #[tokio::test]
    async fn routing_script_sets_route_in_order() {
        let node = MockNode::routing("c1", vec!["no", "yes"]);
        node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(node.route(), Some("no"));
        node.execute(NodeOutput::empty()).await.unwrap();
        assert_eq!(node.route(), Some("yes"));
    }
}
