//! Arize Phoenix adapter — a span tracer exporting OTLP/HTTP JSON.
//!
//! One tracer lives for one item. Finished spans are buffered and posted to
//! the collector in a single `resourceSpans` document on flush.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use flowlm_core::error::ObservabilityError;
use flowlm_core::{CredentialBag, Span, SpanContext, SpanStatus, Tracer};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:6006/v1/traces";
pub const DEFAULT_PROJECT_NAME: &str = "default";

/// Characters of tool output kept on a `tool_<name>` span.
pub const TOOL_OUTPUT_LIMIT: usize = 1000;

// ── Config ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PhoenixConfig {
    pub collector_url: String,
    pub project_name: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for PhoenixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixConfig")
            .field("collector_url", &self.collector_url)
            .field("project_name", &self.project_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl PhoenixConfig {
    pub fn new(collector_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            collector_url: collector_url.into(),
            project_name: project_name.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    /// Read the `phoenix*` fields of a combined credential, or the plain
    /// fields of a stand-alone `phoenixApi` credential. Every field has a default.
    pub fn from_credentials(credentials: &CredentialBag) -> Self {
        let standalone = credentials.credential_type() == "phoenixApi";
        let pick = |prefixed: &str, plain: &str| {
            credentials
                .string(prefixed)
                .or_else(|| credentials.string(plain).filter(|_| standalone))
                .map(str::to_string)
        };

        let config = Self::new(
            pick("phoenixCollectorUrl", "collectorUrl")
                .unwrap_or_else(|| DEFAULT_COLLECTOR_URL.into()),
            pick("phoenixProjectName", "projectName")
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.into()),
        );
        match pick("phoenixApiKey", "apiKey") {
            Some(key) => config.with_api_key(key),
            None => config,
        }
    }
}

// ── Span records ──────────────────────────────────────────────────────────

/// A finished span as it will be exported.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_unix_nanos: i64,
    pub end_unix_nanos: i64,
    pub attributes: Vec<(String, Value)>,
    pub status: SpanStatus,
}

impl SpanRecord {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

fn unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

type Sink = Arc<Mutex<Vec<SpanRecord>>>;

fn lock(sink: &Sink) -> MutexGuard<'_, Vec<SpanRecord>> {
    sink.lock().unwrap_or_else(|e| e.into_inner())
}

struct PhoenixSpan {
    record: SpanRecord,
    sink: Sink,
}

impl Span for PhoenixSpan {
    fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.record.trace_id.clone(),
            span_id: self.record.span_id.clone(),
        }
    }

    fn set_attribute(&mut self, key: &str, value: Value) {
        self.record.attributes.push((key.to_string(), value));
    }

    fn end(self: Box<Self>, status: SpanStatus) {
        let mut record = self.record;
        record.end_unix_nanos = unix_nanos();
        record.status = status;
        lock(&self.sink).push(record);
    }
}

// ── Tracer ────────────────────────────────────────────────────────────────

/// Span tracer for one item, exporting to a Phoenix collector.
pub struct PhoenixTracer {
    config: PhoenixConfig,
    service_name: String,
    http: reqwest::Client,
    finished: Sink,
}

impl PhoenixTracer {
    pub fn new(
        config: PhoenixConfig,
        service_name: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            service_name: service_name.into(),
            http,
            finished: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &PhoenixConfig {
        &self.config
    }

    /// Spans ended so far and not yet exported.
    pub fn finished_spans(&self) -> Vec<SpanRecord> {
        lock(&self.finished).clone()
    }

    /// The OTLP/JSON export document for `spans`.
    pub fn export_body(&self, spans: &[SpanRecord]) -> Value {
        let resource = [
            ("service.name", json!(self.service_name)),
            ("project.name", json!(self.config.project_name)),
            ("openinference.project.name", json!(self.config.project_name)),
        ];

        json!({
            "resourceSpans": [{
                "resource": {
                    "attributes": resource
                        .iter()
                        .map(|(k, v)| key_value(k, v))
                        .collect::<Vec<_>>()
                },
                "scopeSpans": [{
                    "scope": { "name": "flowlm", "version": env!("CARGO_PKG_VERSION") },
                    "spans": spans.iter().map(otlp_span).collect::<Vec<_>>()
                }]
            }]
        })
    }
}

#[async_trait]
impl Tracer for PhoenixTracer {
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Box<dyn Span> {
        let (trace_id, parent_span_id) = match parent {
            Some(p) => (p.trace_id.clone(), Some(p.span_id.clone())),
            None => (new_trace_id(), None),
        };
        Box::new(PhoenixSpan {
            record: SpanRecord {
                trace_id,
                span_id: new_span_id(),
                parent_span_id,
                name: name.to_string(),
                start_unix_nanos: unix_nanos(),
                end_unix_nanos: 0,
                attributes: Vec::new(),
                status: SpanStatus::Unset,
            },
            sink: self.finished.clone(),
        })
    }

    async fn flush(&self) -> Result<(), ObservabilityError> {
        let spans: Vec<SpanRecord> = std::mem::take(&mut *lock(&self.finished));
        if spans.is_empty() {
            return Ok(());
        }

        debug!(
            collector = %self.config.collector_url,
            spans = spans.len(),
            "Exporting spans to Phoenix"
        );

        let mut request = self
            .http
            .post(&self.config.collector_url)
            .header("Content-Type", "application/json")
            .json(&self.export_body(&spans));
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObservabilityError::ExportFailed(format!("Phoenix: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ObservabilityError::ExportFailed(format!(
                "Phoenix collector returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

// --- OTLP JSON encoding ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OtlpStatus {
    code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn otlp_status(status: &SpanStatus) -> OtlpStatus {
    match status {
        SpanStatus::Unset => OtlpStatus { code: 0, message: None },
        SpanStatus::Ok => OtlpStatus { code: 1, message: None },
        SpanStatus::Error(message) => OtlpStatus {
            code: 2,
            message: Some(message.clone()),
        },
    }
}

fn any_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Bool(b) => json!({ "boolValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "intValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(any_value).collect::<Vec<_>>() }
        }),
        Value::Null => json!({ "stringValue": "" }),
        Value::Object(_) => json!({ "stringValue": value.to_string() }),
    }
}

fn key_value(key: &str, value: &Value) -> Value {
    json!({ "key": key, "value": any_value(value) })
}

fn otlp_span(span: &SpanRecord) -> Value {
    let mut out = json!({
        "traceId": span.trace_id,
        "spanId": span.span_id,
        "name": span.name,
        "kind": 1,
        "startTimeUnixNano": span.start_unix_nanos.to_string(),
        "endTimeUnixNano": span.end_unix_nanos.to_string(),
        "attributes": span.attributes.iter().map(|(k, v)| key_value(k, v)).collect::<Vec<_>>(),
        "status": otlp_status(&span.status),
    });
    if let Some(parent) = &span.parent_span_id {
        out["parentSpanId"] = json!(parent);
    }
    out
}

/// Truncate tool output for a span attribute, on a character boundary.
pub fn truncate_output(output: &str) -> String {
    output.chars().take(TOOL_OUTPUT_LIMIT).collect()
}
