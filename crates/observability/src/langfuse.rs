//! Langfuse adapter — a callback handler plus a small ingestion client.
//!
//! Events (trace, generation and span create/update) are buffered in memory
//! and sent in one batch to `{baseUrl}/api/public/ingestion` on flush.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use flowlm_core::error::{CredentialError, ObservabilityError, ProviderError};
use flowlm_core::usage::usage_of;
use flowlm_core::{CallbackHandler, CredentialBag, LlmRun, Message, ProviderResponse};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metadata::{opt_string, parse_custom_metadata, parse_tags};

pub const DEFAULT_BASE_URL: &str = "https://cloud.langfuse.com";

// ── Config ────────────────────────────────────────────────────────────────

/// Where and as whom to send events.
#[derive(Clone)]
pub struct LangfuseConfig {
    pub base_url: String,
    pub public_key: String,
    secret_key: String,
}

impl std::fmt::Debug for LangfuseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangfuseConfig")
            .field("base_url", &self.base_url)
            .field("public_key", &self.public_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl LangfuseConfig {
    pub fn new(
        base_url: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Read a stand-alone `langfuseApi` credential (`baseUrl`, `publicKey`,
    /// `secretKey`) or a combined provider credential whose Langfuse fields
    /// carry the `langfuse` prefix.
    pub fn from_credentials(credentials: &CredentialBag) -> Result<Self, CredentialError> {
        let field = |prefixed: &str, plain: &str| -> Result<String, CredentialError> {
            match credentials.string(prefixed) {
                Some(v) => Ok(v.to_string()),
                None => credentials.require(plain).map(str::to_string),
            }
        };

        let base_url = credentials
            .string("langfuseBaseUrl")
            .or_else(|| {
                credentials
                    .string("baseUrl")
                    .filter(|_| credentials.string("publicKey").is_some())
            })
            .unwrap_or(DEFAULT_BASE_URL);

        Ok(Self::new(
            base_url,
            field("langfusePublicKey", "publicKey")?,
            field("langfuseSecretKey", "secretKey")?,
        ))
    }

    fn authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.public_key, self.secret_key));
        format!("Basic {token}")
    }
}

// ── Trace options ─────────────────────────────────────────────────────────

/// Per-node trace attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceOptions {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Map<String, Value>,
    pub trace_name: Option<String>,
}

impl TraceOptions {
    /// Read a `langfuseMetadata` / `langfuseOptions` collection parameter
    /// (`sessionId`, `userId`, `tags`, `customMetadata`, `traceName`).
    pub fn from_value(options: &Value) -> Self {
        Self {
            session_id: opt_string(options, "sessionId"),
            user_id: opt_string(options, "userId"),
            tags: parse_tags(options.get("tags").and_then(Value::as_str)),
            metadata: parse_custom_metadata(options.get("customMetadata")),
            trace_name: opt_string(options, "traceName"),
        }
    }
}

// ── Ingestion client ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    id: String,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    body: Value,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Buffers ingestion events and ships them on [`flush`](Self::flush).
pub struct LangfuseClient {
    config: LangfuseConfig,
    http: reqwest::Client,
    pending: Mutex<Vec<IngestionEvent>>,
}

impl LangfuseClient {
    pub fn new(config: LangfuseConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &LangfuseConfig {
        &self.config
    }

    fn pending(&self) -> MutexGuard<'_, Vec<IngestionEvent>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, kind: &'static str, body: Value) {
        self.pending().push(IngestionEvent {
            id: Uuid::new_v4().to_string(),
            timestamp: now(),
            kind,
            body,
        });
    }

    /// Event types waiting for the next flush, oldest first.
    pub fn pending_kinds(&self) -> Vec<&'static str> {
        self.pending().iter().map(|e| e.kind).collect()
    }

    /// Open a new trace.
    pub fn trace(self: &Arc<Self>, name: &str, options: &TraceOptions) -> LangfuseTrace {
        let id = Uuid::new_v4().to_string();
        self.enqueue("trace-create", trace_body(&id, name, options));
        LangfuseTrace {
            client: self.clone(),
            id,
        }
    }

    /// Send every buffered event. The buffer is emptied even on failure.
    pub async fn flush(&self) -> Result<(), ObservabilityError> {
        let batch: Vec<IngestionEvent> = std::mem::take(&mut *self.pending());
        if batch.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/public/ingestion", self.config.base_url);
        debug!(url = %url, events = batch.len(), "Flushing Langfuse events");

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.config.authorization())
            .json(&json!({ "batch": batch }))
            .send()
            .await
            .map_err(|e| ObservabilityError::ExportFailed(format!("Langfuse: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ObservabilityError::ExportFailed(format!(
                "Langfuse returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

fn trace_body(id: &str, name: &str, options: &TraceOptions) -> Value {
    let mut body = json!({
        "id": id,
        "name": name,
        "timestamp": now(),
    });
    if let Some(session_id) = &options.session_id {
        body["sessionId"] = json!(session_id);
    }
    if let Some(user_id) = &options.user_id {
        body["userId"] = json!(user_id);
    }
    if let Some(tags) = &options.tags {
        body["tags"] = json!(tags);
    }
    if !options.metadata.is_empty() {
        body["metadata"] = Value::Object(options.metadata.clone());
    }
    body
}

// ── Traces and spans ──────────────────────────────────────────────────────

/// A trace created through [`LangfuseClient::trace`].
pub struct LangfuseTrace {
    client: Arc<LangfuseClient>,
    id: String,
}

impl LangfuseTrace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span(&self, name: &str, input: Value) -> LangfuseSpan {
        let id = Uuid::new_v4().to_string();
        self.client.enqueue(
            "span-create",
            json!({
                "id": id,
                "traceId": self.id,
                "name": name,
                "startTime": now(),
                "input": input,
            }),
        );
        LangfuseSpan {
            client: self.client.clone(),
            trace_id: self.id.clone(),
            id,
        }
    }

    /// Record the trace's output and extra metadata.
    pub fn update(&self, output: Value, metadata: Option<Map<String, Value>>) {
        let mut body = json!({ "id": self.id, "output": output });
        if let Some(metadata) = metadata {
            body["metadata"] = Value::Object(metadata);
        }
        self.client.enqueue("trace-create", body);
    }
}

/// An open span; consumed when ended.
pub struct LangfuseSpan {
    client: Arc<LangfuseClient>,
    trace_id: String,
    id: String,
}

impl LangfuseSpan {
    pub fn end(self, output: Value) {
        self.client.enqueue(
            "span-update",
            json!({
                "id": self.id,
                "traceId": self.trace_id,
                "endTime": now(),
                "output": output,
            }),
        );
    }

    pub fn fail(self, message: &str) {
        self.client.enqueue(
            "span-update",
            json!({
                "id": self.id,
                "traceId": self.trace_id,
                "endTime": now(),
                "level": "ERROR",
                "statusMessage": message,
            }),
        );
    }
}

// ── Callback handler ──────────────────────────────────────────────────────

/// Records every model invocation as a Langfuse generation.
///
/// All invocations made through one handler share a single trace, created
/// lazily on the first call.
pub struct LangfuseHandler {
    client: Arc<LangfuseClient>,
    options: TraceOptions,
    trace_id: Mutex<Option<String>>,
}

impl LangfuseHandler {
    pub fn new(client: Arc<LangfuseClient>, options: TraceOptions) -> Self {
        Self {
            client,
            options,
            trace_id: Mutex::new(None),
        }
    }

    pub fn from_credentials(
        credentials: &CredentialBag,
        options: TraceOptions,
        http: reqwest::Client,
    ) -> Result<Self, CredentialError> {
        let config = LangfuseConfig::from_credentials(credentials)?;
        Ok(Self::new(Arc::new(LangfuseClient::new(config, http)), options))
    }

    pub fn client(&self) -> &Arc<LangfuseClient> {
        &self.client
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    fn trace_for(&self, run: &LlmRun) -> String {
        let mut slot = self.trace_id.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = slot.as_ref() {
            return id.clone();
        }

        let name = self
            .options
            .trace_name
            .clone()
            .or_else(|| run.metadata.get("trace_name").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("{}-chat", run.provider));

        let mut options = self.options.clone();
        for (k, v) in &run.metadata {
            if k != "trace_name" {
                options.metadata.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        let id = Uuid::new_v4().to_string();
        self.client.enqueue("trace-create", trace_body(&id, &name, &options));
        *slot = Some(id.clone());
        id
    }
}

fn message_json(message: &Message) -> Value {
    let mut value = json!({ "role": message.role.as_str(), "content": message.content });
    if !message.tool_calls.is_empty() {
        value["tool_calls"] = json!(message.tool_calls);
    }
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    value
}

#[async_trait]
impl CallbackHandler for LangfuseHandler {
    fn name(&self) -> &str {
        "langfuse"
    }

    async fn on_llm_start(&self, run: &LlmRun, messages: &[Message]) {
        let trace_id = self.trace_for(run);
        self.client.enqueue(
            "generation-create",
            json!({
                "id": run.run_id,
                "traceId": trace_id,
                "name": run.provider,
                "model": run.model,
                "startTime": run.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                "input": messages.iter().map(message_json).collect::<Vec<_>>(),
                "metadata": run.metadata,
            }),
        );
    }

    async fn on_llm_end(&self, run: &LlmRun, response: &ProviderResponse) {
        let mut body = json!({
            "id": run.run_id,
            "traceId": self.trace_for(run),
            "endTime": now(),
            "output": message_json(&response.message),
        });
        if let Some(usage) = usage_of(response) {
            body["usage"] = json!({
                "input": usage.prompt_tokens,
                "output": usage.completion_tokens,
                "total": usage.total_tokens,
                "unit": "TOKENS",
            });
        }
        self.client.enqueue("generation-update", body);
    }

    async fn on_llm_error(&self, run: &LlmRun, error: &ProviderError) {
        self.client.enqueue(
            "generation-update",
            json!({
                "id": run.run_id,
                "traceId": self.trace_for(run),
                "endTime": now(),
                "level": "ERROR",
                "statusMessage": error.to_string(),
            }),
        );
    }

    async fn flush(&self) -> Result<(), ObservabilityError> {
        let result = self.client.flush().await;
        if let Err(e) = &result {
            warn!(error = %e, "Langfuse flush failed");
        }
        result
    }
}
