//! Node registry — maps type identifiers to node factories.
//!
//! The registry is an explicit factory table: each built-in node module
//! contributes its identifier and a constructor taking the node's
//! [`NodeConfig`]. Unknown identifiers are a build error that aborts
//! workflow loading.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::builtin;
use crate::error::NodeError;
use crate::payload::NodeConfig;
use crate::traits::WorkflowNode;

pub type NodeFactory = fn(NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError>;

pub struct NodeRegistry {
    factories: BTreeMap<&'static str, NodeFactory>,
}

impl NodeRegistry {
    /// An empty registry; callers register factories themselves.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry preloaded with every built-in node type.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(builtin::counter::IDENTIFIER, builtin::counter::create);
        registry.register(
            builtin::string_iterator::IDENTIFIER,
            builtin::string_iterator::create,
        );
        registry.register(
            builtin::webhook_producer::IDENTIFIER,
            builtin::webhook_producer::create,
        );
        registry.register(builtin::queue_writer::IDENTIFIER, builtin::queue_writer::create);
        registry.register(builtin::queue_reader::IDENTIFIER, builtin::queue_reader::create);
        registry.register(builtin::if_condition::IDENTIFIER, builtin::if_condition::create);
        registry.register(builtin::for_each::IDENTIFIER, builtin::for_each::create);
        registry.register(
            builtin::data_transformer::IDENTIFIER,
            builtin::data_transformer::create,
        );
        registry.register(builtin::static_delay::IDENTIFIER, builtin::static_delay::create);
        registry.register(builtin::http_response::IDENTIFIER, builtin::http_response::create);
        registry.register(builtin::file_writer::IDENTIFIER, builtin::file_writer::create);
        debug!(count = registry.factories.len(), "registered built-in node types");
        registry
    }

    pub fn register(&mut self, identifier: &'static str, factory: NodeFactory) {
        self.factories.insert(identifier, factory);
    }

    /// Instantiate a node from its config.
    pub fn create(&self, config: NodeConfig) -> Result<Arc<dyn WorkflowNode>, NodeError> {
        match self.factories.get(config.node_type.as_str()) {
            Some(factory) => {
                let node = factory(config)?;
                debug!(
                    node_id = node.base().id(),
                    node_type = node.node_type(),
                    kind = node.kind().as_str(),
                    "instantiated node"
                );
                Ok(node)
            }
            None => Err(NodeError::UnknownType {
                requested: config.node_type,
                available: self.identifiers(),
            }),
        }
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
