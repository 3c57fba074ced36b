//! Google Gemini native provider (`generateContent`).
//!
//! Gemini has no tool-call ids; calls and their responses are matched by
//! function name, so parsed tool calls carry the function name as their id.

use std::time::Duration;

use async_trait::async_trait;
use flowlm_core::error::ProviderError;
use flowlm_core::message::{Message, MessageToolCall, Role};
use flowlm_core::provider::*;
use flowlm_core::usage::Usage;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::http::{check_status, network_error, read_json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_parts: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(json!({"text": msg.content})),
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{"text": msg.content}]
                })),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(json!({"text": msg.content}));
                    }
                    for tc in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": tc.name,
                                "args": tc.parsed_arguments().unwrap_or_else(|_| json!({}))
                            }
                        }));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let part = json!({
                        "functionResponse": {
                            "name": msg.tool_call_id.clone().unwrap_or_default(),
                            "response": {"content": msg.content}
                        }
                    });
                    // Responses to one turn's calls go back in a single user turn.
                    let merge = contents.last().is_some_and(|c| {
                        c["role"] == "user"
                            && c["parts"].as_array().is_some_and(|parts| {
                                parts.iter().all(|p| p.get("functionResponse").is_some())
                            })
                    });
                    match contents.last_mut().and_then(|c| c["parts"].as_array_mut()) {
                        Some(parts) if merge => parts.push(part),
                        _ => contents.push(json!({"role": "user", "parts": [part]})),
                    }
                }
            }
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_k) = request.top_k {
            generation_config.insert("topK".into(), json!(top_k));
        }
        if let Some(top_p) = request.top_p {
            generation_config.insert("topP".into(), json!(top_p));
        }
        if !request.stop.is_empty() {
            generation_config.insert("stopSequences".into(), json!(request.stop));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });

        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({"parts": system_parts});
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        for (key, value) in &request.extra {
            body[key.as_str()] = value.clone();
        }

        body
    }

    fn to_provider_response(
        resp: GeminiResponse,
        model: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No candidates in Gemini response".into(),
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(MessageToolCall {
                    id: call.name.clone(),
                    name: call.name,
                    arguments: call.args.unwrap_or_else(|| json!({})).to_string(),
                });
            }
        }

        let mut message = Message::assistant(text);
        message.tool_calls = tool_calls;
        if let Some(reason) = candidate.finish_reason {
            message.metadata.insert("finish_reason".into(), json!(reason));
        }

        let usage = resp
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count));

        Ok(ProviderResponse {
            message,
            usage,
            model: resp.model_version.unwrap_or_else(|| model.to_string()),
            metadata: serde_json::Map::new(),
        })
    }
}

#[async_trait]
impl flowlm_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = Self::build_body(&request);

        debug!(provider = "gemini", model = %request.model, "Sending completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.json(&body).send().await.map_err(network_error)?;
        let response = check_status(response, "Gemini").await?;
        let resp: GeminiResponse = read_json(response, "Gemini").await?;

        Self::to_provider_response(resp, &request.model)
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
