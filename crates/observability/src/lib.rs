//! Observability adapters for FlowLM.
//!
//! Three vendor styles are supported:
//!
//! - **Langfuse**: a [`CallbackHandler`](flowlm_core::CallbackHandler)
//!   prepended to a model's handlers, plus trace/span helpers for tools.
//! - **Helicone**: no exporter at all; requests are routed through Helicone
//!   proxy URLs with `Helicone-*` headers.
//! - **Arize Phoenix**: a [`Tracer`](flowlm_core::Tracer) buffering spans and
//!   exporting them over OTLP/HTTP.
//!
//! [`LoggingHandler`] mirrors model events into `tracing` for every model.

pub mod helicone;
pub mod langfuse;
pub mod logging;
pub mod metadata;
pub mod phoenix;

pub use helicone::{HeliconeOptions, HeliconeRoute};
pub use langfuse::{LangfuseClient, LangfuseConfig, LangfuseHandler, LangfuseTrace, TraceOptions};
pub use logging::LoggingHandler;
pub use metadata::{parse_custom_metadata, parse_tags};
pub use phoenix::{PhoenixConfig, PhoenixTracer, SpanRecord};
