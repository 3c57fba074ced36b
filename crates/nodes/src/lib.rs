//! # FlowLM Nodes
//!
//! Workflow nodes exposing FlowLM to a host. A host wires nodes together
//! through typed ports:
//!
//! - **Model sub-nodes** (`lmChat*`) supply a configured [`ChatModel`](flowlm_core::ChatModel)
//! - **Observability wrapper** (`observabilityLangfuse`) re-supplies a model with Langfuse attached
//! - **Tool sub-nodes** (`toolQdrantSearch*`) supply a Qdrant search tool
//! - **Agent root nodes** (`aiAgent*`) run one tool-calling turn per input item
//!
//! The host side of the contract is the [`NodeContext`] trait. The
//! credential catalogue describes every credential type a node may ask for.

pub mod connections;
pub mod credentials;
pub mod description;
pub mod error;
pub mod host;
pub mod node;
pub mod nodes;
pub mod registry;

pub use credentials::{CREDENTIAL_TYPES, CredentialType, find_credential_type};
pub use description::{NodeDescription, NodeParameter, Port};
pub use error::NodeError;
pub use host::{ConnectionData, ConnectionType, NodeContext, NodeItem, Params, SupplyData};
pub use node::Node;
pub use registry::NodeRegistry;
