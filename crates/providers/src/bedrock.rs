//! AWS Bedrock provider using the Converse API.
//!
//! Requests are signed with AWS Signature Version 4 (`bedrock` service).
//! Temporary credentials add the `x-amz-security-token` header.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowlm_core::error::ProviderError;
use flowlm_core::message::{Message, MessageToolCall, Role};
use flowlm_core::provider::*;
use flowlm_core::usage::Usage;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::http::{check_status, network_error, read_json};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "bedrock";

/// Static or temporary AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

pub struct BedrockProvider {
    region: String,
    credentials: AwsCredentials,
    endpoint: Option<String>,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl BedrockProvider {
    pub fn new(
        region: impl Into<String>,
        credentials: AwsCredentials,
        client: reqwest::Client,
    ) -> Self {
        Self {
            region: region.into(),
            credentials,
            endpoint: None,
            client,
            timeout: None,
        }
    }

    /// Override the runtime endpoint (VPC endpoints, local stubs).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let mut system = Vec::new();
        let mut messages: Vec<Value> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system.push(json!({"text": msg.content})),
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": [{"text": msg.content}]
                })),
                Role::Assistant => {
                    let mut content = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(json!({"text": msg.content}));
                    }
                    for tc in &msg.tool_calls {
                        content.push(json!({"toolUse": {
                            "toolUseId": tc.reply_id(),
                            "name": tc.name,
                            "input": tc.parsed_arguments().unwrap_or_else(|_| json!({})),
                        }}));
                    }
                    messages.push(json!({"role": "assistant", "content": content}));
                }
                Role::Tool => {
                    let block = json!({"toolResult": {
                        "toolUseId": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": [{"text": msg.content}],
                    }});
                    let merge = messages.last().is_some_and(|m| {
                        m["role"] == "user"
                            && m["content"]
                                .as_array()
                                .is_some_and(|c| c.iter().all(|b| b.get("toolResult").is_some()))
                    });
                    match messages.last_mut().and_then(|m| m["content"].as_array_mut()) {
                        Some(content) if merge => content.push(block),
                        _ => messages.push(json!({"role": "user", "content": [block]})),
                    }
                }
            }
        }

        let mut inference = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            inference.insert("maxTokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            inference.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            inference.insert("topP".into(), json!(top_p));
        }
        if !request.stop.is_empty() {
            inference.insert("stopSequences".into(), json!(request.stop));
        }

        let mut body = json!({ "messages": messages });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !inference.is_empty() {
            body["inferenceConfig"] = Value::Object(inference);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({"toolSpec": {
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": {"json": t.parameters},
                    }})
                })
                .collect();
            body["toolConfig"] = json!({ "tools": tools });
        }
        for (key, value) in &request.extra {
            body[key.as_str()] = value.clone();
        }
        body
    }

    fn to_provider_response(resp: ConverseResponse, model: &str) -> ProviderResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.output.message.content {
            if let Some(t) = block.text {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            if let Some(tool_use) = block.tool_use {
                tool_calls.push(MessageToolCall {
                    id: tool_use.tool_use_id,
                    name: tool_use.name,
                    arguments: tool_use.input.to_string(),
                });
            }
        }

        let mut message = Message::assistant(text);
        message.tool_calls = tool_calls;
        if let Some(reason) = resp.stop_reason {
            message.metadata.insert("stop_reason".into(), json!(reason));
        }

        ProviderResponse {
            message,
            usage: resp
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens)),
            model: model.to_string(),
            metadata: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl flowlm_core::Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let endpoint = self.endpoint();
        let path = format!("/model/{}/converse", uri_encode(&request.model));
        let url = format!("{endpoint}{path}");
        let host = reqwest::Url::parse(&endpoint)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{h}:{port}"),
                    None => h.to_string(),
                })
            })
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("Invalid Bedrock endpoint '{endpoint}'"))
            })?;

        let payload = serde_json::to_vec(&Self::build_body(&request)).map_err(|e| {
            ProviderError::NotConfigured(format!("Failed to encode Bedrock request: {e}"))
        })?;

        let headers = sign_request(
            &self.credentials,
            &self.region,
            &host,
            &path,
            &payload,
            Utc::now(),
        )?;

        debug!(
            provider = "bedrock",
            model = %request.model,
            region = %self.region,
            "Sending Converse request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.body(payload).send().await.map_err(network_error)?;
        let response = check_status(response, "AWS Bedrock").await?;
        let resp: ConverseResponse = read_json(response, "AWS Bedrock").await?;

        Ok(Self::to_provider_response(resp, &request.model))
    }
}

// ── SigV4 ──

fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProviderError::NotConfigured(format!("Invalid signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Headers (`x-amz-date`, optional `x-amz-security-token`, `authorization`)
/// signing a JSON POST to `path` on `host`.
pub(crate) fn sign_request(
    credentials: &AwsCredentials,
    region: &str,
    host: &str,
    path: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, ProviderError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let token = credentials.session_token.as_deref().filter(|t| !t.is_empty());

    let mut canonical_headers = format!(
        "content-type:application/json\nhost:{host}\nx-amz-date:{amz_date}\n"
    );
    let mut signed_headers = String::from("content-type;host;x-amz-date");
    if let Some(token) = token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }

    // Non-S3 services encode each path segment a second time.
    let canonical_uri = path
        .split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/");

    let canonical_request = format!(
        "POST\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex::encode(Sha256::digest(payload))
    );

    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac(format!("AWS4{}", credentials.secret_access_key).as_bytes(), &date)?;
    let k_region = hmac(&k_date, region)?;
    let k_service = hmac(&k_region, SERVICE)?;
    let k_signing = hmac(&k_service, "aws4_request")?;
    let signature = hex::encode(hmac(&k_signing, &string_to_sign)?);

    let mut headers = vec![("x-amz-date", amz_date)];
    if let Some(token) = token {
        headers.push(("x-amz-security-token", token.to_string()));
    }
    headers.push((
        "authorization",
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
    ));
    Ok(headers)
}

// --- Converse API types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ConverseUsage>,
}

#[derive(Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Deserialize)]
struct ConverseMessage {
    #[serde(default)]
    content: Vec<ConverseBlock>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseBlock {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_use: Option<ConverseToolUse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u32,
    output_tokens: u32,
}
