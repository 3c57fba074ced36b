//! ChatModel — a provider plus everything bound to it.
//!
//! A `ChatModel` is what model nodes hand to agents. It carries the sampling
//! settings chosen at construction, the tools bound for function calling, the
//! callback handlers observing each invocation and the metadata attached by
//! observability wrappers. Binding returns a new model; the original is
//! left untouched.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::callback::{CallbackHandler, LlmRun};
use crate::error::ProviderError;
use crate::message::Message;
use crate::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};

/// Sampling parameters fixed when the model is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Provider-specific request fields (`response_format`, `options`, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// A chat-capable model ready for invocation.
#[derive(Clone)]
pub struct ChatModel {
    provider: Arc<dyn Provider>,
    settings: ModelSettings,
    tools: Vec<ToolDefinition>,
    callbacks: Vec<Arc<dyn CallbackHandler>>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("provider", &self.provider.name())
            .field("settings", &self.settings)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("callbacks", &self.callback_names())
            .finish()
    }
}

impl ChatModel {
    pub fn new(provider: Arc<dyn Provider>, settings: ModelSettings) -> Self {
        Self {
            provider,
            settings,
            tools: Vec::new(),
            callbacks: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    pub fn callback_names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|c| c.name()).collect()
    }

    /// A copy of this model that advertises `tools` to the provider.
    pub fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Self {
        let mut bound = self.clone();
        bound.tools = tools;
        bound
    }

    /// A copy with `handler` running before every existing handler.
    pub fn with_handler_first(&self, handler: Arc<dyn CallbackHandler>) -> Self {
        let mut bound = self.clone();
        bound.callbacks.insert(0, handler);
        bound
    }

    /// A copy with `handler` appended after the existing handlers.
    pub fn with_handler(&self, handler: Arc<dyn CallbackHandler>) -> Self {
        let mut bound = self.clone();
        bound.callbacks.push(handler);
        bound
    }

    /// A copy whose metadata is extended by `metadata`; later keys win.
    pub fn with_metadata(&self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut bound = self.clone();
        bound.metadata.extend(metadata);
        bound
    }

    fn request(&self, messages: &[Message]) -> ProviderRequest {
        ProviderRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            top_p: self.settings.top_p,
            top_k: self.settings.top_k,
            tools: self.tools.clone(),
            stop: self.settings.stop.clone(),
            extra: self.settings.extra.clone(),
        }
    }

    /// Send `messages` to the provider, notifying every callback handler.
    pub async fn invoke(&self, messages: &[Message]) -> Result<ProviderResponse, ProviderError> {
        let run = LlmRun {
            run_id: Uuid::new_v4().to_string(),
            provider: self.provider.name().to_string(),
            model: self.settings.model.clone(),
            started_at: Utc::now(),
            metadata: self.metadata.clone(),
        };

        for handler in &self.callbacks {
            handler.on_llm_start(&run, messages).await;
        }

        debug!(
            provider = %run.provider,
            model = %run.model,
            messages = messages.len(),
            tools = self.tools.len(),
            "Invoking chat model"
        );

        match self.provider.complete(self.request(messages)).await {
            Ok(response) => {
                for handler in &self.callbacks {
                    handler.on_llm_end(&run, &response).await;
                }
                Ok(response)
            }
            Err(e) => {
                for handler in &self.callbacks {
                    handler.on_llm_error(&run, &e).await;
                }
                Err(e)
            }
        }
    }

    /// Flush every handler. Failures are logged, never returned.
    pub async fn flush_callbacks(&self) {
        for handler in &self.callbacks {
            if let Err(e) = handler.flush().await {
                warn!(handler = handler.name(), error = %e, "Callback flush failed");
            }
        }
    }
}
