//! A callback handler that mirrors model events into `tracing`.

use async_trait::async_trait;
use chrono::Utc;
use flowlm_core::error::ProviderError;
use flowlm_core::usage::usage_of;
use flowlm_core::{CallbackHandler, LlmRun, Message, ProviderResponse};
use tracing::{debug, info, warn};

/// Logs every invocation made through the model it is attached to.
#[derive(Debug, Default, Clone)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

fn elapsed_ms(run: &LlmRun) -> i64 {
    Utc::now()
        .signed_duration_since(run.started_at)
        .num_milliseconds()
        .max(0)
}

#[async_trait]
impl CallbackHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_llm_start(&self, run: &LlmRun, messages: &[Message]) {
        debug!(
            run_id = %run.run_id,
            provider = %run.provider,
            model = %run.model,
            messages = messages.len(),
            "LLM call started"
        );
    }

    async fn on_llm_end(&self, run: &LlmRun, response: &ProviderResponse) {
        let usage = usage_of(response).unwrap_or_default();
        info!(
            run_id = %run.run_id,
            provider = %run.provider,
            model = %run.model,
            duration_ms = elapsed_ms(run),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            tool_calls = response.message.tool_calls.len(),
            "LLM call finished"
        );
    }

    async fn on_llm_error(&self, run: &LlmRun, error: &ProviderError) {
        warn!(
            run_id = %run.run_id,
            provider = %run.provider,
            model = %run.model,
            duration_ms = elapsed_ms(run),
            error = %error,
            "LLM call failed"
        );
    }
}
