//! Node configuration files and in-process wiring of sub-nodes.
//!
//! A node configuration names the root node's parameters and, per port,
//! the sub-nodes connected to it:
//!
//! ```json
//! {
//!   "parameters": { "promptType": "define", "text": "What is 2+2?" },
//!   "connections": {
//!     "ai_languageModel_llmObs": [
//!       { "node": "lmChatOpenAi", "parameters": { "model": "gpt-4o-mini" } }
//!     ],
//!     "ai_tool": [
//!       {
//!         "node": "toolQdrantSearchPhoenix",
//!         "parameters": { "collectionName": "docs" },
//!         "connections": { "ai_embedding": [{ "node": "embeddingsOpenAi" }] }
//!       }
//!     ]
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowlm_config::AppConfig;
use flowlm_core::Embeddings;
use flowlm_nodes::{ConnectionData, ConnectionType, NodeContext, NodeError, NodeRegistry};
use flowlm_providers::{ClientOptions, build_openai_embeddings};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::host::{CliHost, CredentialStore};

/// Built-in embeddings sub-node over the `openAiApi` credential.
pub const EMBEDDINGS_OPENAI: &str = "embeddingsOpenAi";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default)]
    pub connections: HashMap<ConnectionType, Vec<SubNodeConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubNodeConfig {
    /// Registered node type name
    pub node: String,

    #[serde(flatten)]
    pub config: NodeConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid JSON in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Items must be a JSON object or an array of objects")]
    InvalidItems,

    #[error("Sub-node '{node}' on port {connection} failed: {source}")]
    SubNode {
        node: String,
        connection: ConnectionType,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Node(#[from] NodeError),
}

fn read_json(path: &Path) -> Result<Value, HostError> {
    let content = std::fs::read_to_string(path).map_err(|e| HostError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| HostError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Input items from a JSON file. A single object is one item; objects
/// shaped `{"json": {...}}` are unwrapped.
pub fn read_items(path: &Path) -> Result<Vec<Value>, HostError> {
    items_from_value(read_json(path)?)
}

pub fn items_from_value(value: Value) -> Result<Vec<Value>, HostError> {
    let unwrap = |item: Value| match item {
        Value::Object(mut map)
            if map.len() == 1 && map.get("json").is_some_and(Value::is_object) =>
        {
            map.remove("json").ok_or(HostError::InvalidItems)
        }
        Value::Object(map) => Ok(Value::Object(map)),
        _ => Err(HostError::InvalidItems),
    };

    match value {
        Value::Array(items) => items.into_iter().map(unwrap).collect(),
        object @ Value::Object(_) => Ok(vec![unwrap(object)?]),
        _ => Err(HostError::InvalidItems),
    }
}

pub fn read_node_config(path: &Path) -> Result<NodeConfig, HostError> {
    serde_json::from_value(read_json(path)?).map_err(|e| HostError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ── Wiring ───────────────────────────────────────────────────────────────

/// Build the host for a node described by `config`, supplying every
/// connected sub-node first. Sub-nodes are supplied for item 0.
pub fn build_host<'a>(
    registry: &'a NodeRegistry,
    config: &'a NodeConfig,
    items: Vec<Value>,
    credentials: Arc<CredentialStore>,
    app: &'a AppConfig,
) -> BoxFuture<'a, Result<CliHost, HostError>> {
    Box::pin(async move {
        let mut host =
            CliHost::new(items.clone(), config.parameters.clone(), credentials.clone(), app);

        for (&connection, sub_nodes) in &config.connections {
            let mut supplied = Vec::with_capacity(sub_nodes.len());
            for sub in sub_nodes {
                let child =
                    build_host(registry, &sub.config, items.clone(), credentials.clone(), app)
                        .await?;
                let data = supply(registry, &sub.node, &child)
                    .await
                    .map_err(|source| HostError::SubNode {
                        node: sub.node.clone(),
                        connection,
                        source,
                    })?;
                debug!(node = %sub.node, connection = %connection, "Supplied sub-node");
                supplied.push(data);
            }

            let data = match supplied.len() {
                0 => continue,
                1 => supplied.remove(0),
                _ => ConnectionData::List(supplied),
            };
            host = host.with_connection(connection, data);
        }

        Ok(host)
    })
}

async fn supply(
    registry: &NodeRegistry,
    node: &str,
    host: &CliHost,
) -> Result<ConnectionData, NodeError> {
    if node == EMBEDDINGS_OPENAI {
        return openai_embeddings(host).await;
    }
    let supplied = registry.require(node)?.supply_data(host, 0).await?;
    Ok(ConnectionData::Supplied(Box::new(supplied)))
}

async fn openai_embeddings(host: &CliHost) -> Result<ConnectionData, NodeError> {
    let credentials = host.get_credentials("openAiApi").await?;
    let api_key = credentials.require("apiKey").map_err(NodeError::from)?;
    let model = host
        .get_node_parameter("model", 0)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

    let mut client = ClientOptions::from_env(host.http_config());
    if let Some(url) = credentials.string("url") {
        client = client.with_base_url(url);
    }
    let embeddings: Arc<dyn Embeddings> =
        Arc::new(build_openai_embeddings(api_key, &model, &client)?);
    Ok(ConnectionData::Embeddings(embeddings))
}
