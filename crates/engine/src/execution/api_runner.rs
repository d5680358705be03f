//! API runner — single-pass synchronous traversal for request/response.
//!
//! Unlike the production runner there is no loop: the start node runs
//! with the request's input, every downstream node runs sequentially (no
//! non-blocking early exit), and the output of the last executed node is
//! returned to the caller. Any node failure re-raises to the caller,
//! which surfaces it as the request failure. The caller encloses `run`
//! in a deadline.

use std::sync::Mutex;

use futures::future::{join_all, BoxFuture};
use nodes::{NodeKind, NodeOutput};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::execution::context::ExecContext;
use crate::execution::fork_join::merge_branch_outputs;
use crate::execution::subdag::run_loop_node;
use crate::graph::FlowNode;

pub struct ApiFlowRunner {
    start_node_id: String,
    ctx: ExecContext,
    last_output: Mutex<Option<NodeOutput>>,
}

impl ApiFlowRunner {
    pub fn new(start_node_id: impl Into<String>, ctx: ExecContext) -> Self {
        Self {
            start_node_id: start_node_id.into(),
            ctx,
            last_output: Mutex::new(None),
        }
    }

    fn record_output(&self, output: &NodeOutput) {
        *self.last_output.lock().expect("last output lock poisoned") = Some(output.clone());
    }

    /// Execute the workflow once from start to finish and return the
    /// last executed node's output.
    pub async fn run(&self, input: NodeOutput) -> Result<NodeOutput, EngineError> {
        self.ctx.init_reachable(&self.start_node_id).await?;

        let start = self.ctx.node(&self.start_node_id)?;
        info!(node_id = start.id, "api execution starting");

        let mut output = self.ctx.run_node(start, input).await?;
        if start.instance.kind() == NodeKind::Loop && !output.is_execution_completed() {
            output = run_loop_node(&self.ctx, start, output).await?;
        }
        self.record_output(&output);

        self.process_downstream(start, output).await?;

        let last = self
            .last_output
            .lock()
            .expect("last output lock poisoned")
            .clone();
        last.ok_or_else(|| EngineError::NodeNotFound(self.start_node_id.clone()))
    }

    fn process_downstream<'a>(
        &'a self,
        current: &'a FlowNode,
        output: NodeOutput,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let children = self.ctx.selected_children(current, &output);
            if children.is_empty() {
                debug!(last_node_id = current.id, "api execution reached end of workflow");
                return Ok(());
            }

            if !output.is_execution_completed() && children.len() > 1 {
                if let Some(join_id) = self.ctx.find_join(&children) {
                    // Fork: branches run concurrently, the join sees the
                    // merged payload, traversal continues past it once.
                    let branch_outputs = join_all(
                        children
                            .iter()
                            .filter(|root| root.as_str() != join_id)
                            .map(|root| {
                                self.ctx.run_branch_until_join(root, output.clone(), &join_id)
                            }),
                    )
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?;

                    let merged = merge_branch_outputs(&output, &branch_outputs);
                    return self.run_child(&join_id, merged).await;
                }
            }

            for child_id in children {
                self.run_child(&child_id, output.clone()).await?;
            }
            Ok(())
        })
    }

    async fn run_child(&self, child_id: &str, input: NodeOutput) -> Result<(), EngineError> {
        let child = self.ctx.node(child_id)?;
        let mut output = self.ctx.run_node(child, input).await?;

        if child.instance.kind() == NodeKind::Loop && !output.is_execution_completed() {
            output = run_loop_node(&self.ctx, child, output).await?;
        }

        self.record_output(&output);
        self.process_downstream(child, output).await
    }
}
