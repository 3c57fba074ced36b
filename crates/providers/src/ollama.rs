//! Ollama native provider (`/api/chat`).
//!
//! Sampling settings travel inside the `options` object; `keep_alive` and
//! `format` are top-level request fields and arrive through the request's
//! `extra` map.

use std::time::Duration;

use async_trait::async_trait;
use flowlm_core::error::ProviderError;
use flowlm_core::message::{Message, MessageToolCall};
use flowlm_core::provider::*;
use flowlm_core::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::http::{check_status, network_error, read_json};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client,
            timeout: None,
        }
    }

    /// Optional bearer token for authenticated Ollama deployments.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let messages: Vec<OllamaMessage> = request
            .messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().into(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({"function": {
                            "name": tc.name,
                            "arguments": tc.parsed_arguments().unwrap_or_else(|_| json!({}))
                        }})
                    })
                    .collect(),
            })
            .collect();

        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_k) = request.top_k {
            options.insert("top_k".into(), json!(top_k));
        }
        if let Some(top_p) = request.top_p {
            options.insert("top_p".into(), json!(top_p));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if !request.stop.is_empty() {
            options.insert("stop".into(), json!(request.stop));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
        });

        // Node-level options (num_ctx, repeat_penalty, ...) extend the sampling set.
        let mut extra = request.extra.clone();
        if let Some(Value::Object(more)) = extra.remove("options") {
            options.extend(more);
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({"type": "function", "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }})
                })
                .collect();
        }

        for (key, value) in extra {
            body[key.as_str()] = value;
        }

        body
    }

    fn to_provider_response(resp: OllamaResponse) -> ProviderResponse {
        let tool_calls = resp
            .message
            .tool_calls
            .into_iter()
            .map(|tc| MessageToolCall {
                id: String::new(),
                name: tc.function.name,
                arguments: tc.function.arguments.to_string(),
            })
            .collect();

        let mut message = Message::assistant(resp.message.content);
        message.tool_calls = tool_calls;
        if let Some(reason) = resp.done_reason {
            message.metadata.insert("finish_reason".into(), json!(reason));
        }

        let prompt = resp.prompt_eval_count.unwrap_or(0);
        let completion = resp.eval_count.unwrap_or(0);
        let usage = (prompt + completion > 0).then(|| Usage::new(prompt, completion));

        ProviderResponse {
            message,
            usage,
            model: resp.model,
            metadata: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl flowlm_core::Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = "ollama",
            model = %request.model,
            url = %url,
            "Sending completion request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(network_error)?;
        let response = check_status(response, "Ollama").await?;
        let resp: OllamaResponse = read_json(response, "Ollama").await?;

        Ok(Self::to_provider_response(resp))
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
