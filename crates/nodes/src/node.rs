//! The node trait every FlowLM node implements.

use async_trait::async_trait;

use crate::description::NodeDescription;
use crate::error::NodeError;
use crate::host::{NodeContext, NodeItem, SupplyData};

/// A workflow node.
///
/// Sub-nodes (models, tools, observability wrappers) implement
/// [`supply_data`](Node::supply_data) and hand a collaborator to whatever
/// they are connected to. Root nodes (agents) implement
/// [`execute`](Node::execute) and turn input items into result records.
#[async_trait]
pub trait Node: Send + Sync {
    fn description(&self) -> NodeDescription;

    async fn supply_data(
        &self,
        _ctx: &dyn NodeContext,
        _item: usize,
    ) -> Result<SupplyData, NodeError> {
        Err(NodeError::Unsupported {
            node: self.description().name,
            operation: "supply_data",
        })
    }

    async fn execute(&self, _ctx: &dyn NodeContext) -> Result<Vec<NodeItem>, NodeError> {
        Err(NodeError::Unsupported {
            node: self.description().name,
            operation: "execute",
        })
    }

    /// Whether the node produces collaborators rather than items.
    fn is_sub_node(&self) -> bool {
        !self
            .description()
            .outputs
            .iter()
            .any(|o| *o == crate::host::ConnectionType::Main)
    }
}
