//! Fork-join merge helpers.
//!
//! A join node's input is the pre-fork payload's data plus every key from
//! every branch's terminal output, merged in branch iteration order with
//! the existing collision policy (`key`, `key_2`, `key_3`, …). The merged
//! id and metadata are inherited from the pre-fork payload.

use nodes::payload::unique_output_key;
use nodes::{DataMap, NodeOutput};

/// Merge all branch outputs into one payload for the join node.
///
/// Call after all branches have completed; merging is single-threaded and
/// deterministic given the branch order. Zero branches yield the initial
/// payload unchanged.
pub fn merge_branch_outputs(initial: &NodeOutput, branch_outputs: &[NodeOutput]) -> NodeOutput {
    let mut merged: DataMap = initial.data.clone();
    for branch in branch_outputs {
        for (key, value) in &branch.data {
            let resolved = unique_output_key(&merged, key);
            merged.insert(resolved, value.clone());
        }
    }
    NodeOutput::with_parts(initial.id, merged, initial.metadata.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output_with(data: serde_json::Value) -> NodeOutput {
        NodeOutput::new(data.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn combines_initial_and_all_branch_keys() {
        let initial = output_with(json!({ "initial": 1 }));
        let branch_a = output_with(json!({ "page_loader": { "url": "a" } }));
        let branch_b = output_with(json!({ "interceptor": { "requests": [] } }));

        let merged = merge_branch_outputs(&initial, &[branch_a, branch_b]);
        assert_eq!(merged.data["initial"], 1);
        assert_eq!(merged.data["page_loader"], json!({ "url": "a" }));
        assert_eq!(merged.data["interceptor"], json!({ "requests": [] }));
        assert_eq!(merged.id, initial.id);
    }

    #[test]
    fn resolves_collisions_in_branch_order() {
        let initial = output_with(json!({}));
        let branch_a = output_with(json!({ "result": "a" }));
        let branch_b = output_with(json!({ "result": "b" }));
        let branch_c = output_with(json!({ "result": "c" }));

        let merged = merge_branch_outputs(&initial, &[branch_a, branch_b, branch_c]);
        assert_eq!(merged.data["result"], "a");
        assert_eq!(merged.data["result_2"], "b");
        assert_eq!(merged.data["result_3"], "c");
    }

    #[test]
    fn zero_branches_returns_the_initial_payload() {
        let initial = output_with(json!({ "x": 1 }));
        let merged = merge_branch_outputs(&initial, &[]);
        assert_eq!(merged.data, initial.data);
        assert_eq!(merged.id, initial.id);
    }

    #[test]
    fn merge_is_deterministic_for_a_given_order() {
        let initial = output_with(json!({ "pre": 0 }));
        let branches = [
            output_with(json!({ "k": 1, "other": true })),
            output_with(json!({ "k": 2 })),
        ];
        let once = merge_branch_outputs(&initial, &branches);
        let twice = merge_branch_outputs(&initial, &branches);
        assert_eq!(once.data, twice.data);
    }
}
