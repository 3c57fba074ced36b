//! Node implementations.

pub mod agent;
pub mod langfuse;
pub mod model;
pub mod qdrant;

pub use agent::{HeliconeAgentNode, LlmObsAgentNode, PhoenixAgentNode};
pub use langfuse::LangfuseObservabilityNode;
pub use model::{MODEL_NODES, ModelNode, ModelNodeSpec, find_model_node};
pub use qdrant::{QdrantFlavor, QdrantSearchNode};
