//! Callback handlers — observers attached to a chat model.
//!
//! A handler is told when a model invocation starts, finishes, or fails.
//! Logging and callback-style observability vendors (Langfuse) are handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ObservabilityError, ProviderError};
use crate::message::Message;
use crate::provider::ProviderResponse;

/// Identity of one model invocation, shared by its start/end/error events.
#[derive(Debug, Clone)]
pub struct LlmRun {
    pub run_id: String,
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    /// Metadata bound to the model (custom metadata, `trace_name`, ...)
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// Short name, used in logs.
    fn name(&self) -> &str;

    async fn on_llm_start(&self, _run: &LlmRun, _messages: &[Message]) {}

    async fn on_llm_end(&self, _run: &LlmRun, _response: &ProviderResponse) {}

    async fn on_llm_error(&self, _run: &LlmRun, _error: &ProviderError) {}

    /// Deliver anything buffered. Handlers without a backlog succeed immediately.
    async fn flush(&self) -> std::result::Result<(), ObservabilityError> {
        Ok(())
    }
}
