//! Embeddings trait and a provider-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{EmbeddingRequest, Provider};

/// Something that turns a query into a vector.
#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// Embeddings computed through a [`Provider`]'s `embed` endpoint.
pub struct ProviderEmbeddings {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbeddings {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embeddings for ProviderEmbeddings {
    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await?;

        response.embeddings.into_iter().next().ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "Embedding response contained no vectors".into(),
        })
    }
}
