//! LLM provider implementations for FlowLM.
//!
//! All providers implement the `flowlm_core::Provider` trait. The registry
//! maps a provider id from a node parameter to the right client and its
//! defaults.

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
mod http;
pub mod ollama;
pub mod openai_compat;
pub mod proxy;
pub mod registry;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use bedrock::{AwsCredentials, BedrockProvider};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use proxy::{ClientCache, ProxySettings};
pub use registry::{
    ClientOptions, ModelOptions, PROVIDERS, Protocol, ProviderSpec, build_chat_model,
    build_openai_embeddings, find_provider,
};
pub use retry::RetryProvider;
