//! Sub-DAG execution for loop nodes.
//!
//! A loop node's `execute` resolves `data.items`; the runner then walks
//! the graph behind the node's "subdag" branch once per element, feeding
//! each pass a payload that carries the iteration state under
//! `data.forEachNode = {input, results, state: {index, item}}`, and
//! collects the terminal outputs of every pass into `results`.

use futures::future::BoxFuture;
use nodes::{NodeKind, NodeOutput};
use serde_json::{json, Value};
use tracing::info;

use crate::error::EngineError;
use crate::execution::context::ExecContext;
use crate::graph::FlowNode;

/// Data key carrying the iteration state and collected results.
pub const FOR_EACH_KEY: &str = "forEachNode";

/// Branch key of a loop node's body entry.
pub const SUBDAG_KEY: &str = "subdag";

/// Payload for one iteration: the base payload plus the iteration state.
pub fn iteration_payload(
    base: &NodeOutput,
    items: &[Value],
    results: &[Value],
    index: usize,
) -> NodeOutput {
    let mut data = base.data.clone();
    data.insert(
        FOR_EACH_KEY.to_owned(),
        json!({
            "input": items,
            "results": results,
            "state": { "index": index, "item": items.get(index) },
        }),
    );
    NodeOutput::with_parts(base.id, data, base.metadata.clone())
}

/// One iteration's entry in `results`: a single sink's data directly, or
/// the list of every sink's data when the sub-DAG has several terminals.
pub fn iteration_result_entry(collected: &[NodeOutput]) -> Value {
    let outputs: Vec<Value> = collected
        .iter()
        .map(|output| Value::Object(output.data.clone()))
        .collect();
    match outputs.len() {
        1 => outputs.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(outputs),
    }
}

/// Walk the sub-DAG from `entry_id` as a single-pass mini-run and collect
/// the terminal nodes' outputs. Conditional routing applies; there is no
/// non-blocking early exit inside a sub-DAG pass.
pub fn run_subdag_once(
    ctx: &ExecContext,
    entry_id: String,
    payload: NodeOutput,
) -> BoxFuture<'_, Result<Vec<NodeOutput>, EngineError>> {
    Box::pin(async move {
        let flow_node = ctx.node(&entry_id)?;
        let mut output = ctx.run_node(flow_node, payload).await?;

        if flow_node.instance.kind() == NodeKind::Loop && !output.is_execution_completed() {
            output = run_loop_node(ctx, flow_node, output).await?;
        }

        let children = ctx.selected_children(flow_node, &output);
        if children.is_empty() {
            return Ok(vec![output]);
        }

        let mut collected = Vec::new();
        for child_id in children {
            collected.extend(run_subdag_once(ctx, child_id, output.clone()).await?);
        }
        Ok(collected)
    })
}

/// Run every iteration of a loop node and attach the `forEachNode`
/// summary to its output, which then continues through "default".
pub fn run_loop_node<'a>(
    ctx: &'a ExecContext,
    loop_node: &'a FlowNode,
    mut output: NodeOutput,
) -> BoxFuture<'a, Result<NodeOutput, EngineError>> {
    Box::pin(async move {
        let items: Vec<Value> = output
            .data
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let entry_id = loop_node.children(SUBDAG_KEY).first().cloned();
        let mut results: Vec<Value> = Vec::new();

        if let Some(entry_id) = entry_id {
            for index in 0..items.len() {
                let payload = iteration_payload(&output, &items, &results, index);
                let collected = run_subdag_once(ctx, entry_id.clone(), payload).await?;
                results.push(iteration_result_entry(&collected));
            }
        }

        info!(
            node_id = loop_node.id,
            iterations = items.len(),
            "loop iterations completed"
        );

        let state = match items.last() {
            Some(last) => json!({ "index": items.len() - 1, "item": last }),
            None => json!({ "index": 0, "item": null }),
        };
        output.data.insert(
            FOR_EACH_KEY.to_owned(),
            json!({ "input": items, "results": results, "state": state }),
        );
        Ok(output)
    })
}
