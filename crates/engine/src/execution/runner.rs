//! Production runner — one infinite loop per producer node.
//!
//! Each iteration dispatches the producer with an empty payload and walks
//! its downstream graph. Transient node failures do not kill the
//! pipeline: they are emitted, logged, and the loop sleeps briefly before
//! the next iteration. The loop ends when the producer returns the
//! termination sentinel (which is then broadcast downstream so every
//! reachable node cleans up) or when the runner is shut down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use nodes::{NodeKind, NodeOutput};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::execution::context::ExecContext;
use crate::execution::fork_join::merge_branch_outputs;
use crate::execution::subdag::run_loop_node;
use crate::graph::FlowNode;

const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

/// Manages a single producer loop in production mode.
pub struct FlowRunner {
    producer_id: String,
    ctx: ExecContext,
    cancel: CancellationToken,
    sinks: TaskTracker,
    sink_aborts: Mutex<Vec<AbortHandle>>,
    loop_count: AtomicU64,
    producer_cleaned: AtomicBool,
}

impl FlowRunner {
    /// Errors unless `producer_id` names a producer node.
    pub fn new(producer_id: impl Into<String>, ctx: ExecContext) -> Result<Self, EngineError> {
        let producer_id = producer_id.into();
        let flow_node = ctx.node(&producer_id)?;
        if flow_node.instance.kind() != NodeKind::Producer {
            return Err(EngineError::NotAProducer(producer_id));
        }
        Ok(Self {
            producer_id,
            ctx,
            cancel: CancellationToken::new(),
            sinks: TaskTracker::new(),
            sink_aborts: Mutex::new(Vec::new()),
            loop_count: AtomicU64::new(0),
            producer_cleaned: AtomicBool::new(false),
        })
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count.load(Ordering::Relaxed)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Initialize the reachable set and run the main loop until the
    /// producer completes or the runner is shut down.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.ctx.init_reachable(&self.producer_id).await?;
        let result = self.main_loop().await;
        self.shutdown(false).await;
        result
    }

    async fn main_loop(&self) -> Result<(), EngineError> {
        loop {
            if self.cancel.is_cancelled() {
                info!(node_id = %self.producer_id, "runner received shutdown signal");
                return Ok(());
            }
            self.loop_count.fetch_add(1, Ordering::Relaxed);

            let producer = self.ctx.node(&self.producer_id)?;
            match self.ctx.run_node(producer, NodeOutput::empty()).await {
                Ok(output) if output.is_execution_completed() => {
                    self.cleanup_producer(producer).await;
                    // Broadcast the sentinel so every downstream node
                    // runs its cleanup.
                    self.process_downstream(producer, output).await;
                    return Ok(());
                }
                Ok(output) => {
                    self.process_downstream(producer, output).await;
                }
                Err(error) => {
                    // Retry-forever policy: the failure was emitted by
                    // the dispatcher; sleep briefly and keep looping.
                    warn!(
                        node_id = %self.producer_id,
                        error = %error,
                        "error in producer loop"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(FAILURE_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// Recursively walk downstream of a completed node.
    ///
    /// Failures inside a branch are contained: the affected path stops,
    /// sibling branches and the producer loop continue.
    fn process_downstream<'a>(
        &'a self,
        current: &'a FlowNode,
        output: NodeOutput,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let children = self.ctx.selected_children(current, &output);
            if children.is_empty() {
                return;
            }

            if !output.is_execution_completed() && children.len() > 1 {
                if let Some(join_id) = self.ctx.find_join(&children) {
                    self.run_fork_join(&children, &join_id, output).await;
                    return;
                }
                // Plain fan-out: each path runs concurrently.
                join_all(
                    children
                        .iter()
                        .map(|child_id| self.run_child(child_id.clone(), output.clone())),
                )
                .await;
                return;
            }

            for child_id in children {
                self.run_child(child_id, output.clone()).await;
            }
        })
    }

    /// Dispatch the branches of a fork concurrently, merge their terminal
    /// outputs at the join, and continue past it once.
    async fn run_fork_join(&self, branch_roots: &[String], join_id: &str, pre_fork: NodeOutput) {
        let branch_results = join_all(
            branch_roots
                .iter()
                .filter(|root| root.as_str() != join_id)
                .map(|root| self.ctx.run_branch_until_join(root, pre_fork.clone(), join_id)),
        )
        .await;

        let mut branch_outputs = Vec::new();
        for result in branch_results {
            match result {
                Ok(output) => branch_outputs.push(output),
                Err(error) => warn!(join_id, error = %error, "fork branch failed"),
            }
        }

        let merged = merge_branch_outputs(&pre_fork, &branch_outputs);
        self.run_child(join_id.to_owned(), merged).await;
    }

    /// Run one child and recurse below it.
    ///
    /// Non-blocking sinks are spawned and not awaited — the producer loop
    /// may begin its next iteration while they finish. Sentinel
    /// deliveries are always awaited so cleanups complete in order.
    async fn run_child(&self, child_id: String, input: NodeOutput) {
        let Ok(child) = self.ctx.node(&child_id) else {
            warn!(%child_id, "downstream node disappeared from graph");
            return;
        };

        if !input.is_execution_completed() && child.instance.kind() == NodeKind::NonBlocking {
            let ctx = self.ctx.clone();
            let handle = self.sinks.spawn(async move {
                if let Ok(node) = ctx.node(&child_id) {
                    // Events and logging happen inside run_node.
                    let _ = ctx.run_node(node, input).await;
                }
            });
            self.sink_aborts
                .lock()
                .expect("sink handle lock poisoned")
                .push(handle.abort_handle());
            return;
        }

        match self.ctx.run_node(child, input).await {
            Ok(mut output) => {
                if child.instance.kind() == NodeKind::Loop && !output.is_execution_completed() {
                    match run_loop_node(&self.ctx, child, output).await {
                        Ok(looped) => output = looped,
                        Err(error) => {
                            warn!(node_id = %child.id, error = %error, "loop iteration failed");
                            return;
                        }
                    }
                }
                if child.instance.kind() == NodeKind::NonBlocking {
                    // Terminal sink; this path ends here.
                    return;
                }
                self.process_downstream(child, output).await;
            }
            Err(error) => {
                warn!(node_id = %child.id, error = %error, "error executing node");
            }
        }
    }

    async fn cleanup_producer(&self, producer: &FlowNode) {
        if self.producer_cleaned.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(error) = producer.instance.cleanup(None).await {
            warn!(node_id = %producer.id, error = %error, "producer cleanup failed");
        }
        warn!(node_id = %producer.id, "producer cleanup completed");
    }

    /// Stop the loop. `force` additionally aborts in-flight sink tasks
    /// and closes the executor without waiting. The producer's `cleanup`
    /// always runs.
    pub async fn shutdown(&self, force: bool) {
        info!(
            node_id = %self.producer_id,
            loop_count = self.loop_count(),
            force,
            "shutting down flow runner"
        );
        self.cancel.cancel();
        self.sinks.close();

        if force {
            for handle in self
                .sink_aborts
                .lock()
                .expect("sink handle lock poisoned")
                .drain(..)
            {
                handle.abort();
            }
            self.ctx.executor.shutdown();
        } else {
            self.sinks.wait().await;
        }

        if let Ok(producer) = self.ctx.node(&self.producer_id) {
            self.cleanup_producer(producer).await;
        }
    }
}
