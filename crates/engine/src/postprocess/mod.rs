//! Pluggable passes run after graph construction.

pub mod node_validator;
pub mod queue_mapper;

use std::collections::HashSet;

use crate::error::EngineError;
use crate::graph::FlowGraph;

pub use node_validator::NodeValidator;
pub use queue_mapper::QueueMapper;

/// A post-processing pass over the built graph.
///
/// `scope` restricts the pass to a subset of node ids (used for sub-DAG
/// iteration runs); `None` means the whole graph.
pub trait PostProcess {
    fn name(&self) -> &'static str;

    fn run(&self, graph: &FlowGraph, scope: Option<&HashSet<String>>) -> Result<(), EngineError>;
}

/// The standard pass order: queue mapping first so readiness checks see
/// the assigned queue names.
pub fn standard_passes() -> Vec<Box<dyn PostProcess>> {
    vec![Box::new(QueueMapper), Box::new(NodeValidator)]
}
