//! Errors raised at the node boundary.

use flowlm_core::error::{CredentialError, ProviderError};
use thiserror::Error;

/// Everything that can fail one item of a node.
///
/// With continue-on-fail active the message becomes the item's
/// `{"error": ...}` record; otherwise the whole execution stops.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    MissingCredential(#[from] CredentialError),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    MissingConnection(String),

    #[error(transparent)]
    Provider(ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node '{node}' does not support {operation}")]
    Unsupported {
        node: String,
        operation: &'static str,
    },

    #[error("Unknown node type: {0}")]
    UnknownNode(String),
}

impl From<ProviderError> for NodeError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider(id) => NodeError::UnknownProvider(id),
            ProviderError::NotConfigured(message) => NodeError::Configuration(message),
            other => NodeError::Provider(other),
        }
    }
}

impl NodeError {
    /// Errors caused by the node's own settings rather than a remote service.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NodeError::Configuration(_)
                | NodeError::MissingCredential(_)
                | NodeError::UnknownProvider(_)
                | NodeError::MissingConnection(_)
                | NodeError::UnknownNode(_)
        )
    }
}
