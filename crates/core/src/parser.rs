//! Output parser trait.

use async_trait::async_trait;

use crate::error::ParseError;

/// Turns the model's final text into structured output.
#[async_trait]
pub trait OutputParser: Send + Sync {
    fn name(&self) -> &str;

    async fn parse(&self, text: &str) -> std::result::Result<serde_json::Value, ParseError>;
}
