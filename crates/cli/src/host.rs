//! The CLI side of the node contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowlm_config::{AgentDefaults, AppConfig, HttpConfig};
use flowlm_core::CredentialBag;
use flowlm_core::error::CredentialError;
use flowlm_nodes::{ConnectionData, ConnectionType, NodeContext, find_credential_type};
use serde_json::{Map, Value};
use tracing::{debug, info};

// ── Credentials ──────────────────────────────────────────────────────────

/// Credentials from the config file, completed with catalogue defaults.
#[derive(Clone, Default)]
pub struct CredentialStore {
    stored: BTreeMap<String, Map<String, Value>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("types", &self.stored.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialStore {
    pub fn new(stored: BTreeMap<String, Map<String, Value>>) -> Self {
        Self { stored }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.credentials.clone())
    }

    pub fn insert(&mut self, credential_type: impl Into<String>, fields: Map<String, Value>) {
        self.stored.insert(credential_type.into(), fields);
    }

    /// The stored credential with defaults filled in. Catalogued types must
    /// carry every required field.
    pub fn get(&self, credential_type: &str) -> Result<CredentialBag, CredentialError> {
        let stored = self
            .stored
            .get(credential_type)
            .ok_or_else(|| CredentialError::Unavailable(credential_type.to_string()))?;

        let Some(catalogued) = find_credential_type(credential_type) else {
            return Ok(CredentialBag::new(credential_type, stored.clone()));
        };
        if let Some(field) = catalogued.missing_required(stored).first() {
            return Err(CredentialError::MissingField {
                credential_type: credential_type.to_string(),
                field: field.to_string(),
            });
        }
        Ok(CredentialBag::new(credential_type, catalogued.with_defaults(stored)))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.stored.keys().map(String::as_str)
    }
}

// ── Host ─────────────────────────────────────────────────────────────────

/// An AI event a node reported while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiEvent {
    pub event: String,
    pub payload: String,
}

/// One node's view of the CLI: the same parameters for every item and
/// collaborators resolved before the run.
pub struct CliHost {
    items: Vec<Value>,
    parameters: Map<String, Value>,
    credentials: Arc<CredentialStore>,
    connections: HashMap<ConnectionType, ConnectionData>,
    http: HttpConfig,
    agent: AgentDefaults,
    continue_on_fail: bool,
    events: Mutex<Vec<AiEvent>>,
}

impl CliHost {
    pub fn new(
        items: Vec<Value>,
        parameters: Map<String, Value>,
        credentials: Arc<CredentialStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            items,
            parameters,
            credentials,
            connections: HashMap::new(),
            http: config.http.clone(),
            agent: config.agent.clone(),
            continue_on_fail: false,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connection(mut self, connection: ConnectionType, data: ConnectionData) -> Self {
        self.connections.insert(connection, data);
        self
    }

    pub fn with_continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    pub fn has_connection(&self, connection: ConnectionType) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn events(&self) -> Vec<AiEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NodeContext for CliHost {
    fn input_items(&self) -> Vec<Value> {
        self.items.clone()
    }

    fn get_node_parameter(&self, name: &str, _item: usize) -> Option<Value> {
        self.parameters.get(name).cloned()
    }

    async fn get_credentials(
        &self,
        credential_type: &str,
    ) -> Result<CredentialBag, CredentialError> {
        debug!(credential_type, "Resolving credential");
        self.credentials.get(credential_type)
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
        info!(event, payload, "AI event");
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(AiEvent {
                event: event.to_string(),
                payload: payload.to_string(),
            });
    }

    fn http_config(&self) -> HttpConfig {
        self.http.clone()
    }

    fn agent_defaults(&self) -> AgentDefaults {
        self.agent.clone()
    }
}
