//! Error types for the FlowLM domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all FlowLM operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Credential errors ---
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    // --- Observability errors ---
    #[error("Observability error: {0}")]
    Observability(#[from] ObservabilityError),

    // --- Output parsing ---
    #[error("Output parser error: {0}")]
    Parse(#[from] ParseError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("Credential type '{0}' is not available")]
    Unavailable(String),

    #[error("Credential '{credential_type}' is missing required field '{field}'")]
    MissingField {
        credential_type: String,
        field: String,
    },
}

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Exporter not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Could not parse output: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unknown_provider_names_the_id() {
        let err = Error::Provider(ProviderError::UnknownProvider("watsonx".into()));
        assert!(err.to_string().contains("watsonx"));
    }

    #[test]
    fn missing_credential_field_names_type_and_field() {
        let err = CredentialError::MissingField {
            credential_type: "openAiApi".into(),
            field: "apiKey".into(),
        };
        let text = err.to_string();
        assert!(text.contains("openAiApi"));
        assert!(text.contains("apiKey"));
    }
}
