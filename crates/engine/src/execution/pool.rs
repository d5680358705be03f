//! Pool executor — routes each node call onto its preferred pool.
//!
//! Three lanes:
//! - **async**: the node future runs inline on the caller's task;
//! - **thread**: a bounded spawn onto the runtime's workers (blocking
//!   I/O that still awaits);
//! - **process**: a bounded CPU lane driven to completion off the async
//!   loop entirely.
//!
//! There is no implicit retry; cancellation happens by cancelling the
//! enclosing task.

use std::sync::Arc;
use std::time::Duration;

use nodes::{ExecutionPool, NodeError, NodeOutput, WorkflowNode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const DEFAULT_THREAD_WORKERS: usize = 10;
const DEFAULT_PROCESS_WORKERS: usize = 4;

pub struct PoolExecutor {
    thread_slots: Arc<Semaphore>,
    process_slots: Arc<Semaphore>,
}

impl PoolExecutor {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_THREAD_WORKERS, DEFAULT_PROCESS_WORKERS)
    }

    pub fn with_limits(thread_workers: usize, process_workers: usize) -> Self {
        Self {
            thread_slots: Arc::new(Semaphore::new(thread_workers)),
            process_slots: Arc::new(Semaphore::new(process_workers)),
        }
    }

    /// Stop handing out worker slots. In-flight calls finish; later calls
    /// fail.
    pub fn shutdown(&self) {
        self.thread_slots.close();
        self.process_slots.close();
    }

    /// Execute the node body on its pool and return its output.
    pub async fn execute_in_pool(
        &self,
        pool: ExecutionPool,
        node: Arc<dyn WorkflowNode>,
        input: NodeOutput,
    ) -> Result<NodeOutput, NodeError> {
        match pool {
            ExecutionPool::Async => node.execute(input).await,

            ExecutionPool::Thread => {
                let permit = self
                    .thread_slots
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| NodeError::Failed("executor is shut down".to_owned()))?;
                let handle = tokio::spawn(async move {
                    let result = node.execute(input).await;
                    drop(permit);
                    result
                });
                handle
                    .await
                    .map_err(|e| NodeError::Failed(format!("worker task failed: {e}")))?
            }

            ExecutionPool::Process => {
                let permit = self
                    .process_slots
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| NodeError::Failed("executor is shut down".to_owned()))?;
                let handle = tokio::task::spawn_blocking(move || {
                    // CPU-bound lane: the node future must not depend on
                    // the reactor, so a local block_on suffices.
                    let result = futures::executor::block_on(node.execute(input));
                    drop(permit);
                    result
                });
                handle
                    .await
                    .map_err(|e| NodeError::Failed(format!("worker task failed: {e}")))?
            }
        }
    }

    /// Full dispatch of a payload to a node.
    ///
    /// A sentinel payload triggers `cleanup` instead of the body and then
    /// flows onward unchanged. Otherwise the body runs on its pool, raced
    /// against the node's optional `config.timeout_seconds`, and the
    /// execution counter is bumped on success.
    pub async fn dispatch(
        &self,
        node: Arc<dyn WorkflowNode>,
        input: NodeOutput,
    ) -> Result<NodeOutput, NodeError> {
        if input.is_execution_completed() {
            debug!(node_id = node.base().id(), "sentinel received, running cleanup");
            node.cleanup(Some(&input)).await?;
            warn!(node_id = node.base().id(), "cleanup completed");
            return Ok(input);
        }

        let pool = node.execution_pool();
        let timeout = node_timeout(node.as_ref());
        let fut = self.execute_in_pool(pool, node.clone(), input);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                NodeError::Failed(format!("node timed out after {limit:?}"))
            })??,
            None => fut.await?,
        };

        node.base().bump_execution_count();
        Ok(output)
    }
}

impl Default for PoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-node execution deadline from `config.timeout_seconds`, if any.
fn node_timeout(node: &dyn WorkflowNode) -> Option<Duration> {
    match node.base().config_value("timeout_seconds") {
        Some(Value::Number(n)) => n.as_f64().filter(|s| *s > 0.0).map(Duration::from_secs_f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::mock::MockNode;
    use nodes::{DataMap, NodeKind};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn async_pool_runs_inline() {
        let executor = PoolExecutor::new();
        let node = MockNode::returning("a", NodeKind::Blocking, json!({ "x": 1 }));
        let output = executor
            .dispatch(node.clone(), NodeOutput::empty())
            .await
            .unwrap();
        assert_eq!(output.data["x"], 1);
        assert_eq!(node.base().execution_count(), 1);
    }

    #[tokio::test]
    async fn sentinel_triggers_cleanup_not_execute() {
        let executor = PoolExecutor::new();
        let node = MockNode::returning("a", NodeKind::Blocking, json!({ "x": 1 }));

        let sentinel = NodeOutput::completed(Uuid::new_v4(), DataMap::new());
        let forwarded = executor.dispatch(node.clone(), sentinel).await.unwrap();

        assert!(forwarded.is_execution_completed());
        assert_eq!(node.call_count(), 0);
        assert_eq!(node.cleanup_count(), 1);
        assert_eq!(node.base().execution_count(), 0);
    }

    #[tokio::test]
    async fn failures_pass_through_without_retry() {
        let executor = PoolExecutor::new();
        let node = MockNode::failing("a", NodeKind::Blocking, "boom");
        assert!(executor.dispatch(node.clone(), NodeOutput::empty()).await.is_err());
        assert_eq!(node.call_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_worker_lane_calls() {
        let executor = PoolExecutor::new();
        executor.shutdown();
        let node = MockNode::returning("a", NodeKind::Blocking, json!({}));
        let result = executor
            .execute_in_pool(ExecutionPool::Thread, node, NodeOutput::empty())
            .await;
        assert!(result.is_err());
    }
}
