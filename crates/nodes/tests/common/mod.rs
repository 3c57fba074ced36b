//! Shared fixtures: an in-memory host, a scripted provider and a local
//! capture server standing in for vendor APIs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use flowlm_core::error::{CredentialError, ProviderError};
use flowlm_core::message::{Message, MessageToolCall};
use flowlm_core::provider::{Provider, ProviderRequest, ProviderResponse};
use flowlm_core::usage::Usage;
use flowlm_core::{ChatModel, CredentialBag, ModelSettings};
use flowlm_nodes::{ConnectionData, ConnectionType, NodeContext};
use serde_json::{Map, Value, json};

// ── Host ─────────────────────────────────────────────────────────────────

/// A host backed by plain maps. Parameters are the same for every item.
#[derive(Default)]
pub struct MockHost {
    items: Vec<Value>,
    params: Map<String, Value>,
    credentials: HashMap<String, Map<String, Value>>,
    connections: HashMap<ConnectionType, ConnectionData>,
    continue_on_fail: bool,
    events: Mutex<Vec<(String, String)>>,
}

impl MockHost {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn credential(mut self, credential_type: &str, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.credentials.insert(credential_type.to_string(), fields);
        self
    }

    pub fn connect(mut self, connection: ConnectionType, data: ConnectionData) -> Self {
        self.connections.insert(connection, data);
        self
    }

    pub fn continue_on_fail(mut self) -> Self {
        self.continue_on_fail = true;
        self
    }

    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeContext for MockHost {
    fn input_items(&self) -> Vec<Value> {
        self.items.clone()
    }

    fn get_node_parameter(&self, name: &str, _item: usize) -> Option<Value> {
        self.params.get(name).cloned()
    }

    async fn get_credentials(
        &self,
        credential_type: &str,
    ) -> Result<CredentialBag, CredentialError> {
        self.credentials
            .get(credential_type)
            .map(|fields| CredentialBag::new(credential_type, fields.clone()))
            .ok_or_else(|| CredentialError::Unavailable(credential_type.to_string()))
    }

    async fn get_input_connection_data(
        &self,
        connection: ConnectionType,
        _item: usize,
    ) -> Option<ConnectionData> {
        self.connections.get(&connection).cloned()
    }

    fn continue_on_fail(&self) -> bool {
        self.continue_on_fail
    }

    fn log_ai_event(&self, event: &str, payload: &str) {
        self.events.lock().unwrap().push((event.to_string(), payload.to_string()));
    }
}

// ── Scripted provider ────────────────────────────────────────────────────

/// Returns queued responses in order, then fails.
pub struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: format!("no scripted response #{index}"),
            })
    }
}

pub fn model_over(provider: &Arc<ScriptedProvider>) -> ChatModel {
    ChatModel::new(provider.clone(), ModelSettings::new("scripted-model"))
}

pub fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: Some(Usage::new(10, 5)),
        model: "scripted-model".into(),
        metadata: Map::new(),
    }
}

pub fn tool_call(name: &str, args: Value) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }];
    ProviderResponse {
        message,
        usage: Some(Usage::new(10, 5)),
        model: "scripted-model".into(),
        metadata: Map::new(),
    }
}

// ── Capture server ───────────────────────────────────────────────────────

/// Bodies received per path.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<(String, Value)>>>);

impl Captured {
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn chat_completion(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    captured.0.lock().unwrap().push(("/v1/chat/completions".into(), body));
    Json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "local-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "4" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 7, "completion_tokens": 1, "total_tokens": 8 }
    }))
}

async fn traces(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    captured.0.lock().unwrap().push(("/v1/traces".into(), body));
    Json(json!({}))
}

/// An OpenAI-compatible chat endpoint answering "4" and a trace collector.
pub async fn serve_vendor() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completion))
        .route("/v1/traces", post(traces))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}
