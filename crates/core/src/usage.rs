//! Token usage accounting.
//!
//! Providers report usage in different shapes. Typed clients fill
//! [`ProviderResponse::usage`] directly; anything else is recovered from the
//! raw metadata by trying the known [`UsageShape`]s in priority order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;

use crate::provider::ProviderResponse;

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// The usage layouts seen in provider responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageShape {
    /// `usage_metadata: {input_tokens, output_tokens, total_tokens}`
    UsageMetadata,
    /// `response_metadata.usage`: `prompt_tokens` or `input_tokens`, `completion_tokens` or
    /// `output_tokens`, and `total_tokens`
    ResponseUsage,
    /// `response_metadata.tokenUsage: {promptTokens, completionTokens, totalTokens}`
    TokenUsage,
}

impl UsageShape {
    /// Shapes in the order they are tried.
    pub const PRIORITY: [UsageShape; 3] = [
        UsageShape::UsageMetadata,
        UsageShape::ResponseUsage,
        UsageShape::TokenUsage,
    ];

    fn keys(&self) -> ShapeKeys {
        match self {
            UsageShape::UsageMetadata => ShapeKeys {
                path: &["usage_metadata"],
                prompt: &["input_tokens"],
                completion: &["output_tokens"],
                total: "total_tokens",
            },
            UsageShape::ResponseUsage => ShapeKeys {
                path: &["response_metadata", "usage"],
                prompt: &["prompt_tokens", "input_tokens"],
                completion: &["completion_tokens", "output_tokens"],
                total: "total_tokens",
            },
            UsageShape::TokenUsage => ShapeKeys {
                path: &["response_metadata", "tokenUsage"],
                prompt: &["promptTokens"],
                completion: &["completionTokens"],
                total: "totalTokens",
            },
        }
    }

    /// Try to read usage in this shape from a raw response object.
    pub fn extract(&self, raw: &Value) -> Option<Usage> {
        let keys = self.keys();
        let block = keys.path.iter().try_fold(raw, |v, k| v.get(*k))?;
        if !block.is_object() {
            return None;
        }

        let prompt = first_count(block, keys.prompt);
        let completion = first_count(block, keys.completion);
        let total = count(block, keys.total).unwrap_or(prompt + completion);

        Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        })
    }
}

struct ShapeKeys {
    path: &'static [&'static str],
    prompt: &'static [&'static str],
    completion: &'static [&'static str],
    total: &'static str,
}

fn count(block: &Value, key: &str) -> Option<u32> {
    block.get(key)?.as_u64().map(|n| n as u32)
}

/// First non-zero count among `keys`, mirroring `a || b` fallbacks.
fn first_count(block: &Value, keys: &[&str]) -> u32 {
    keys.iter()
        .filter_map(|k| count(block, k))
        .find(|n| *n > 0)
        .unwrap_or(0)
}

/// Normalise usage from a raw response object, trying every shape in priority order.
pub fn extract_usage(raw: &Value) -> Option<Usage> {
    UsageShape::PRIORITY.iter().find_map(|shape| shape.extract(raw))
}

/// Usage for a provider response: the typed field if present, otherwise the raw metadata.
pub fn usage_of(response: &ProviderResponse) -> Option<Usage> {
    response
        .usage
        .or_else(|| extract_usage(&Value::Object(response.metadata.clone())))
}
