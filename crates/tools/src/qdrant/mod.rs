//! Qdrant vector search: REST client, result formatting and the agent tool.

pub mod client;
pub mod format;
pub mod tool;

pub use client::{QdrantClient, ScoredPoint, SearchRequest};
pub use format::{NO_RESULTS, SearchOptions, format_results};
pub use tool::{DEFAULT_DESCRIPTION, DEFAULT_TOOL_NAME, QdrantSearchTool, SearchTracing};
