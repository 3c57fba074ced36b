//! Shared test helpers: scripted providers, broken memories, counting tracers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowlm_core::error::{MemoryError, ObservabilityError, ProviderError, ToolError};
use flowlm_core::message::{Message, MessageToolCall, Role};
use flowlm_core::provider::{Provider, ProviderRequest, ProviderResponse};
use flowlm_core::usage::Usage;
use flowlm_core::{
    ChatMemory, ChatModel, ModelSettings, Span, SpanContext, SpanStatus, Tool, Tracer,
};
use flowlm_tools::DynamicTool;
use futures::FutureExt;
use serde_json::{Value, json};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        match self.responses.get(index) {
            Some(response) => response.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        }
    }
}

pub fn model(provider: &Arc<SequentialMockProvider>) -> ChatModel {
    ChatModel::new(provider.clone(), ModelSettings::new("mock-model"))
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(
    tool_calls: Vec<MessageToolCall>,
    thought: &str,
) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

pub fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

// ── Tools ────────────────────────────────────────────────────────────────

/// Returns `{"sum": a + b}`.
pub fn add_tool() -> Arc<dyn Tool> {
    Arc::new(DynamicTool::new("add", "Add two numbers", |args: Value| {
        async move {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!({ "sum": a + b }))
        }
        .boxed()
    }))
}

/// Returns its `input` argument unchanged.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(DynamicTool::new("echo", "Echo the input", |args: Value| {
        async move { Ok(args["input"].clone()) }.boxed()
    }))
}

/// Always fails with `reason`.
pub fn failing_tool(reason: &'static str) -> Arc<dyn Tool> {
    Arc::new(DynamicTool::new("broken", "Always fails", move |_args: Value| {
        async move {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: reason.into(),
            })
        }
        .boxed()
    }))
}

// ── Memory ───────────────────────────────────────────────────────────────

pub struct BrokenMemory;

#[async_trait]
impl ChatMemory for BrokenMemory {
    fn name(&self) -> &str {
        "broken"
    }

    async fn load_history(&self) -> Result<Vec<Message>, MemoryError> {
        Err(MemoryError::Storage("disk on fire".into()))
    }

    async fn save_context(&self, _input: &str, _output: &str) -> Result<(), MemoryError> {
        Err(MemoryError::Storage("disk on fire".into()))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}

// ── Counting tracer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EndedSpan {
    pub name: String,
    pub parent: Option<String>,
    pub attributes: Vec<(String, Value)>,
    pub status: SpanStatus,
}

impl EndedSpan {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Default)]
pub struct CountingTracer {
    started: Mutex<usize>,
    ended: Arc<Mutex<Vec<EndedSpan>>>,
    flushes: Mutex<usize>,
}

impl CountingTracer {
    pub fn started(&self) -> usize {
        *self.started.lock().unwrap()
    }

    pub fn ended(&self) -> Vec<EndedSpan> {
        self.ended.lock().unwrap().clone()
    }

    pub fn span(&self, name: &str) -> EndedSpan {
        self.ended()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no span named {name}"))
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap()
    }
}

struct CountingSpan {
    name: String,
    parent: Option<String>,
    attributes: Vec<(String, Value)>,
    sink: Arc<Mutex<Vec<EndedSpan>>>,
}

impl Span for CountingSpan {
    fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: "trace".into(),
            span_id: self.name.clone(),
        }
    }

    fn set_attribute(&mut self, key: &str, value: Value) {
        self.attributes.push((key.to_string(), value));
    }

    fn end(self: Box<Self>, status: SpanStatus) {
        let CountingSpan {
            name,
            parent,
            attributes,
            sink,
        } = *self;
        sink.lock().unwrap().push(EndedSpan {
            name,
            parent,
            attributes,
            status,
        });
    }
}

#[async_trait]
impl Tracer for CountingTracer {
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Box<dyn Span> {
        *self.started.lock().unwrap() += 1;
        Box::new(CountingSpan {
            name: name.to_string(),
            parent: parent.map(|p| p.span_id.clone()),
            attributes: Vec::new(),
            sink: self.ended.clone(),
        })
    }

    async fn flush(&self) -> Result<(), ObservabilityError> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}
