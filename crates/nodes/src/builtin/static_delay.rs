//! Static delay — holds the payload for a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::NodeError;
use crate::payload::{meta, ExecutionPool, NodeConfig, NodeOutput};
use crate::traits::{NodeBase, NodeKind, WorkflowNode};

pub const IDENTIFIER: &str = "static-delay";

const UNITS: &[(&str, f64)] = &[
    ("seconds", 1.0),
    ("minutes", 60.0),
    ("hours", 3600.0),
    ("days", 86400.0),
];

pub struct StaticDelayNode {
    base: NodeBase,
}

pub fn create(config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
    Ok(Arc::new(StaticDelayNode {
        base: NodeBase::new(config),
    }))
}

impl StaticDelayNode {
    fn delay_seconds(&self) -> f64 {
        let interval = self.base.form_f64("interval", 0.0);
        let unit = self
            .base
            .form_str("unit")
            .unwrap_or_else(|| "seconds".to_owned());
        let multiplier = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .unwrap_or(1.0);
        interval * multiplier
    }
}

#[async_trait]
impl WorkflowNode for StaticDelayNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn node_type(&self) -> &'static str {
        IDENTIFIER
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Blocking
    }

    fn execution_pool(&self) -> ExecutionPool {
        ExecutionPool::Async
    }

    fn is_ready(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.base.form_f64("interval", -1.0) < 0.0 {
            errors.push("interval must be a non-negative number".to_owned());
        }
        if let Some(unit) = self.base.form_str("unit") {
            if !UNITS.iter().any(|(name, _)| *name == unit) {
                errors.push(format!("unknown time unit '{unit}'"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    async fn execute(&self, mut input: NodeOutput) -> Result<NodeOutput, NodeError> {
        let seconds = self.delay_seconds();
        info!(node_id = self.base.id(), seconds, "static delay starting");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        info!(node_id = self.base.id(), seconds, "static delay completed");

        input
            .metadata
            .insert(meta::SOURCE_NODE_ID.to_owned(), json!(self.base.id()));
        input
            .metadata
            .insert("delay_seconds".to_owned(), json!(seconds));
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delay(interval: f64, unit: &str) -> Arc<dyn WorkflowNode> {
        let mut config = NodeConfig::new("d1", IDENTIFIER);
        config.data.form = json!({ "interval": interval, "unit": unit })
            .as_object()
            .cloned()
            .unwrap();
        create(config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn passes_data_through_after_sleeping() {
        let node = delay(5.0, "minutes");
        let mut input = NodeOutput::empty();
        input.data.insert("x".into(), json!(1));

        let output = node.execute(input).await.unwrap();
        assert_eq!(output.data["x"], 1);
        assert_eq!(output.metadata["delay_seconds"], json!(300.0));
    }

    #[test]
    fn bad_unit_fails_readiness() {
        let node = delay(1.0, "fortnights");
        assert!(node.is_ready().is_err());
    }
}
