//! `flowlm run` — Execute a root node over input items.

use std::path::PathBuf;
use std::sync::Arc;

use flowlm::{CredentialStore, NodeConfig, build_host, read_items, read_node_config};
use flowlm_config::AppConfig;
use flowlm_memory::BufferWindowMemory;
use flowlm_nodes::{ConnectionData, ConnectionType, NodeRegistry};
use serde_json::json;
use tracing::info;

pub struct RunArgs {
    pub node: String,
    pub items: Option<PathBuf>,
    pub params: Option<PathBuf>,
    pub input: Option<String>,
    pub session: Option<String>,
    pub memory_window: usize,
    pub continue_on_fail: bool,
}

pub async fn run(args: RunArgs, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = NodeRegistry::with_defaults();
    let node = registry.require(&args.node)?;
    if node.is_sub_node() {
        return Err(format!(
            "'{}' is a sub-node; connect it to an agent node in the --params file",
            args.node
        )
        .into());
    }

    let items = match (&args.items, &args.input) {
        (Some(path), _) => read_items(path)?,
        (None, Some(text)) => vec![json!({ "chatInput": text })],
        (None, None) => vec![json!({})],
    };
    let node_config = match &args.params {
        Some(path) => read_node_config(path)?,
        None => NodeConfig::default(),
    };

    let credentials = Arc::new(CredentialStore::from_config(config));
    let mut host = build_host(&registry, &node_config, items, credentials, config)
        .await?
        .with_continue_on_fail(args.continue_on_fail);

    if let Some(session) = args.session {
        if !host.has_connection(ConnectionType::Memory) {
            let memory = BufferWindowMemory::new(session, args.memory_window);
            host = host
                .with_connection(ConnectionType::Memory, ConnectionData::Memory(Arc::new(memory)));
        }
    }

    info!(node = %args.node, "Running node");
    let results = node.execute(&host).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}
