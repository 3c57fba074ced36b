//! Normalising what sub-nodes supply.
//!
//! Hosts hand over connection data in whatever shape the sub-node produced:
//! a bare collaborator, a list when several sub-nodes share a port, or the
//! `supply_data` wrapper itself. These helpers flatten all of that.

use std::sync::Arc;

use flowlm_core::{ChatMemory, ChatModel, Embeddings, OutputParser, Tool, ToolRegistry};
use tracing::warn;

use crate::host::{ConnectionData, ConnectionType, NodeContext};

/// Strip any number of supply-data wrappers.
fn unwrap(data: ConnectionData) -> ConnectionData {
    match data {
        ConnectionData::Supplied(supplied) => unwrap(supplied.response),
        other => other,
    }
}

/// Every tool in `data`, in connection order.
pub fn flatten_tools(data: ConnectionData) -> Vec<Arc<dyn Tool>> {
    match unwrap(data) {
        ConnectionData::Tool(tool) => vec![tool],
        ConnectionData::List(items) => items.into_iter().flat_map(flatten_tools).collect(),
        other => {
            warn!(connection = ?other, "Ignoring non-tool data on the tool port");
            Vec::new()
        }
    }
}

/// The first item of a single-connection port.
fn first(data: ConnectionData) -> Option<ConnectionData> {
    match unwrap(data) {
        ConnectionData::List(items) => items.into_iter().next().and_then(first),
        other => Some(other),
    }
}

pub async fn model(
    ctx: &dyn NodeContext,
    connection: ConnectionType,
    item: usize,
) -> Option<ChatModel> {
    match first(ctx.get_input_connection_data(connection, item).await?)? {
        ConnectionData::Model(model) => Some(model),
        _ => None,
    }
}

/// Connected tools as a registry; empty when nothing is connected.
pub async fn tools(ctx: &dyn NodeContext, item: usize) -> ToolRegistry {
    match ctx.get_input_connection_data(ConnectionType::Tool, item).await {
        Some(data) => ToolRegistry::from_tools(flatten_tools(data)),
        None => ToolRegistry::new(),
    }
}

pub async fn memory(ctx: &dyn NodeContext, item: usize) -> Option<Arc<dyn ChatMemory>> {
    match first(ctx.get_input_connection_data(ConnectionType::Memory, item).await?)? {
        ConnectionData::Memory(memory) => Some(memory),
        _ => None,
    }
}

pub async fn output_parser(ctx: &dyn NodeContext, item: usize) -> Option<Arc<dyn OutputParser>> {
    match first(ctx.get_input_connection_data(ConnectionType::OutputParser, item).await?)? {
        ConnectionData::OutputParser(parser) => Some(parser),
        _ => None,
    }
}

pub async fn embeddings(ctx: &dyn NodeContext, item: usize) -> Option<Arc<dyn Embeddings>> {
    match first(ctx.get_input_connection_data(ConnectionType::Embedding, item).await?)? {
        ConnectionData::Embeddings(embeddings) => Some(embeddings),
        _ => None,
    }
}
