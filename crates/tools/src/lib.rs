//! Tools and output parsers that can be connected to FlowLM agents.
//!
//! - [`DynamicTool`]: a tool built from a name, a schema and an async closure
//! - [`QdrantSearchTool`]: vector search over a Qdrant collection, traced
//!   through Langfuse or Phoenix when configured
//! - [`JsonOutputParser`]: structured output from the model's final text

pub mod dynamic;
pub mod parser;
pub mod qdrant;

pub use dynamic::DynamicTool;
pub use parser::JsonOutputParser;
pub use qdrant::{QdrantClient, QdrantSearchTool, SearchOptions, SearchTracing};
