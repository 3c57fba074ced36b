//! Node registry: every node type by name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::description::NodeDescription;
use crate::error::NodeError;
use crate::node::Node;
use crate::nodes::{
    HeliconeAgentNode, LangfuseObservabilityNode, LlmObsAgentNode, ModelNode, PhoenixAgentNode,
    QdrantSearchNode,
};

/// Registry of node types, in registration order.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every FlowLM node.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for node in ModelNode::all() {
            registry.register(Arc::new(node));
        }
        registry.register(Arc::new(LangfuseObservabilityNode));
        for node in QdrantSearchNode::all() {
            registry.register(Arc::new(node));
        }
        registry.register(Arc::new(LlmObsAgentNode));
        registry.register(Arc::new(HeliconeAgentNode));
        registry.register(Arc::new(PhoenixAgentNode));
        registry
    }

    /// Register a node. Replaces any node with the same name.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        let name = node.description().name;
        if self.nodes.insert(name.clone(), node).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(name).cloned()
    }

    /// Like [`get`](Self::get), failing with [`NodeError::UnknownNode`].
    pub fn require(&self, name: &str) -> Result<Arc<dyn Node>, NodeError> {
        self.get(name).ok_or_else(|| NodeError::UnknownNode(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn descriptions(&self) -> Vec<NodeDescription> {
        self.order
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .map(|node| node.description())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
