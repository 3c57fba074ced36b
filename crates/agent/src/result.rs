//! Turning a finished loop into the node's output item.

use flowlm_core::memory::ChatMemory;
use flowlm_core::parser::OutputParser;
use flowlm_core::usage::Usage;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::tool_loop::IntermediateStep;

/// When `intermediateSteps` appears in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepsPolicy {
    /// Whenever at least one tool ran
    #[default]
    WhenNonEmpty,
    /// Only if the user asked for it and at least one tool ran
    WhenRequested(bool),
}

/// The result of one agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// The final text, or the parser's structured value
    pub output: Value,
    pub steps: Vec<IntermediateStep>,
    pub usage: Usage,
    pub iterations: usize,
}

impl TurnResult {
    /// `{output, intermediateSteps?, tokenUsage?}`.
    pub fn to_json(&self, policy: StepsPolicy) -> Value {
        let mut json = Map::new();
        json.insert("output".into(), self.output.clone());

        let include_steps = match policy {
            StepsPolicy::WhenNonEmpty => !self.steps.is_empty(),
            StepsPolicy::WhenRequested(requested) => requested && !self.steps.is_empty(),
        };
        if include_steps {
            json.insert("intermediateSteps".into(), json!(self.steps));
        }

        if self.usage.total_tokens > 0 {
            json.insert(
                "tokenUsage".into(),
                json!({
                    "promptTokens": self.usage.prompt_tokens,
                    "completionTokens": self.usage.completion_tokens,
                    "totalTokens": self.usage.total_tokens,
                }),
            );
        }
        Value::Object(json)
    }

    /// The output as memory stores it: text as-is, anything else as JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Run the parser over `text`; on failure the raw text is kept.
pub async fn parse_output(parser: Option<&dyn OutputParser>, text: String) -> Value {
    let Some(parser) = parser else {
        return Value::String(text);
    };
    match parser.parse(&text).await {
        Ok(value) => value,
        Err(e) => {
            debug!(
                parser = parser.name(),
                error = %e,
                "Output parser rejected the response, keeping raw text"
            );
            Value::String(text)
        }
    }
}

/// Record the exchange. Failures are logged and otherwise ignored.
pub async fn save_exchange(memory: Option<&dyn ChatMemory>, input: &str, output: &str) {
    if let Some(memory) = memory {
        if let Err(e) = memory.save_context(input, output).await {
            warn!(memory = memory.name(), error = %e, "Failed to save chat history");
        }
    }
}
