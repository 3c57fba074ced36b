//! # FlowLM CLI
//!
//! A local host for FlowLM nodes. Input items come from a JSON file,
//! credentials from the `[credentials]` section of the config, and every
//! connected sub-node is built in-process before the root node runs.

pub mod host;
pub mod workflow;

pub use host::{AiEvent, CliHost, CredentialStore};
pub use workflow::{HostError, NodeConfig, SubNodeConfig, build_host, read_items, read_node_config};
