//! # FlowLM Core
//!
//! Domain types, traits, and error definitions shared by every FlowLM crate.
//! It defines the domain model that the provider clients, observability
//! adapters, agent loop and workflow nodes implement against, and depends on
//! nothing beyond serialization, error and async-trait plumbing.
//!
//! Every collaborator (provider, tool, memory, output parser, embeddings,
//! callback handler, tracer) is a trait here; implementations live in their
//! own crates, and all crates depend inward on this one.

pub mod callback;
pub mod credentials;
pub mod embeddings;
pub mod error;
pub mod memory;
pub mod message;
pub mod model;
pub mod parser;
pub mod provider;
pub mod tool;
pub mod trace;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use callback::{CallbackHandler, LlmRun};
pub use credentials::CredentialBag;
pub use embeddings::{Embeddings, ProviderEmbeddings};
pub use error::{Error, Result};
pub use memory::ChatMemory;
pub use message::{Message, MessageToolCall, Role};
pub use model::{ChatModel, ModelSettings};
pub use parser::OutputParser;
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use trace::{Span, SpanContext, SpanGuard, SpanStatus, Tracer};
pub use usage::{Usage, UsageShape};
