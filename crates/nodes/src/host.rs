//! The host contract: what a workflow host provides to a node, and what a
//! node hands back.
//!
//! FlowLM never talks to a real host. The CLI harness and the tests
//! implement [`NodeContext`] over plain JSON.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use flowlm_config::{AgentDefaults, HttpConfig};
use flowlm_core::error::CredentialError;
use flowlm_core::{ChatMemory, ChatModel, CredentialBag, Embeddings, OutputParser, Tool};
use flowlm_providers::ClientOptions;
use flowlm_providers::proxy::shared_clients;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::NodeError;

// ── Connection types ─────────────────────────────────────────────────────

/// Port types nodes are wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionType {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "ai_languageModel")]
    LanguageModel,
    /// Models accepted by the LLM Obs agent
    #[serde(rename = "ai_languageModel_llmObs")]
    LanguageModelLlmObs,
    #[serde(rename = "ai_memory")]
    Memory,
    #[serde(rename = "ai_tool")]
    Tool,
    #[serde(rename = "ai_outputParser")]
    OutputParser,
    #[serde(rename = "ai_embedding")]
    Embedding,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Main => "main",
            ConnectionType::LanguageModel => "ai_languageModel",
            ConnectionType::LanguageModelLlmObs => "ai_languageModel_llmObs",
            ConnectionType::Memory => "ai_memory",
            ConnectionType::Tool => "ai_tool",
            ConnectionType::OutputParser => "ai_outputParser",
            ConnectionType::Embedding => "ai_embedding",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Connection data ──────────────────────────────────────────────────────

/// A collaborator supplied by an upstream sub-node.
#[derive(Clone)]
pub enum ConnectionData {
    Model(ChatModel),
    Tool(Arc<dyn Tool>),
    Memory(Arc<dyn ChatMemory>),
    OutputParser(Arc<dyn OutputParser>),
    Embeddings(Arc<dyn Embeddings>),
    /// Several sub-nodes connected to the same port
    List(Vec<ConnectionData>),
    /// A sub-node's `supply_data` result passed through unwrapped
    Supplied(Box<SupplyData>),
}

impl fmt::Debug for ConnectionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionData::Model(model) => f.debug_tuple("Model").field(model).finish(),
            ConnectionData::Tool(tool) => f.debug_tuple("Tool").field(&tool.name()).finish(),
            ConnectionData::Memory(memory) => {
                f.debug_tuple("Memory").field(&memory.name()).finish()
            }
            ConnectionData::OutputParser(parser) => {
                f.debug_tuple("OutputParser").field(&parser.name()).finish()
            }
            ConnectionData::Embeddings(_) => f.write_str("Embeddings"),
            ConnectionData::List(items) => f.debug_tuple("List").field(items).finish(),
            ConnectionData::Supplied(supplied) => {
                f.debug_tuple("Supplied").field(&supplied.response).finish()
            }
        }
    }
}

/// What a sub-node returns from `supply_data`.
#[derive(Debug, Clone)]
pub struct SupplyData {
    pub response: ConnectionData,
}

impl SupplyData {
    pub fn new(response: ConnectionData) -> Self {
        Self { response }
    }
}

// ── Result records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// One output record of an `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeItem {
    pub json: Value,
    #[serde(rename = "pairedItem")]
    pub paired_item: PairedItem,
}

impl NodeItem {
    pub fn new(json: Value, item: usize) -> Self {
        Self {
            json,
            paired_item: PairedItem { item },
        }
    }

    /// The record emitted for a failed item under continue-on-fail.
    pub fn error(error: &NodeError, item: usize) -> Self {
        Self::new(json!({ "error": error.to_string() }), item)
    }
}

// ── Host context ─────────────────────────────────────────────────────────

/// The services a host offers a node while it runs.
#[async_trait]
pub trait NodeContext: Send + Sync {
    /// The `json` payload of every input item.
    fn input_items(&self) -> Vec<Value>;

    /// A parameter value for `item`, already resolved by the host.
    fn get_node_parameter(&self, name: &str, item: usize) -> Option<Value>;

    /// The decrypted credential of `credential_type`.
    async fn get_credentials(
        &self,
        credential_type: &str,
    ) -> Result<CredentialBag, CredentialError>;

    /// Whatever is connected to the `connection` port, if anything.
    async fn get_input_connection_data(
        &self,
        connection: ConnectionType,
        item: usize,
    ) -> Option<ConnectionData>;

    fn continue_on_fail(&self) -> bool {
        false
    }

    /// Report an event to the host's AI log panel.
    fn log_ai_event(&self, _event: &str, _payload: &str) {}

    fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
    }

    fn agent_defaults(&self) -> AgentDefaults {
        AgentDefaults::default()
    }
}

/// Client options with the host's HTTP settings and the process proxy environment.
pub fn client_options(ctx: &dyn NodeContext) -> ClientOptions {
    ClientOptions::from_env(ctx.http_config())
}

/// The memoised HTTP client for `url`.
pub fn http_client(ctx: &dyn NodeContext, url: &str) -> Result<reqwest::Client, NodeError> {
    let options = client_options(ctx);
    Ok(shared_clients().client_for(url, &options.proxy, &options.http)?)
}

// ── Parameters ───────────────────────────────────────────────────────────

/// Typed reads of one item's parameters.
pub struct Params<'a> {
    ctx: &'a dyn NodeContext,
    item: usize,
}

impl<'a> Params<'a> {
    pub fn new(ctx: &'a dyn NodeContext, item: usize) -> Self {
        Self { ctx, item }
    }

    pub fn item(&self) -> usize {
        self.item
    }

    /// The raw value; JSON `null` counts as absent.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.ctx.get_node_parameter(name, self.item).filter(|v| !v.is_null())
    }

    pub fn string(&self, name: &str, default: &str) -> String {
        self.opt_string(name).unwrap_or_else(|| default.to_string())
    }

    /// A non-blank string parameter.
    pub fn opt_string(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str, default: bool) -> bool {
        self.value(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// A collection parameter; anything but an object reads as `{}`.
    pub fn collection(&self, name: &str) -> Value {
        match self.value(name) {
            Some(v @ Value::Object(_)) => v,
            _ => Value::Object(Default::default()),
        }
    }

    /// A model name given either as a string or as a `{mode, value}` locator.
    pub fn model_name(&self, name: &str, default: &str) -> String {
        let chosen = match self.value(name) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Object(locator)) => locator
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        };
        chosen
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}
