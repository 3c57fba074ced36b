//! Search options and result formatting.

use serde_json::Value;

use super::client::ScoredPoint;

pub const NO_RESULTS: &str = "No relevant documents found.";
const SEPARATOR: &str = "\n\n---\n\n";

/// The `options` collection of a Qdrant tool node.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    /// `0` means no threshold
    pub score_threshold: f64,
    pub content_payload_key: String,
    pub metadata_payload_key: String,
    pub include_metadata: bool,
    pub filter: Option<Value>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            score_threshold: 0.0,
            content_payload_key: "content".into(),
            metadata_payload_key: "metadata".into(),
            include_metadata: true,
            filter: None,
        }
    }
}

impl SearchOptions {
    /// Read the node's `options` parameter. A non-blank `searchFilterJson`
    /// that is not valid JSON is rejected.
    pub fn from_value(options: &Value) -> Result<Self, String> {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            options
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };

        let filter = match options.get("searchFilterJson").and_then(Value::as_str).map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str(raw).map_err(|_| "Invalid JSON in Search Filter".to_string())?,
            ),
            _ => None,
        };

        Ok(Self {
            top_k: options
                .get("topK")
                .and_then(Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.top_k),
            score_threshold: options
                .get("scoreThreshold")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.score_threshold),
            content_payload_key: text("contentPayloadKey", defaults.content_payload_key),
            metadata_payload_key: text("metadataPayloadKey", defaults.metadata_payload_key),
            include_metadata: options
                .get("includeMetadata")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.include_metadata),
            filter,
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render search results for the model.
pub fn format_results(points: &[ScoredPoint], options: &SearchOptions) -> String {
    if points.is_empty() {
        return NO_RESULTS.to_string();
    }

    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let payload = point.payload.clone().unwrap_or_default();
            let content = payload
                .get(&options.content_payload_key)
                .filter(|v| truthy(v))
                .map(render)
                .unwrap_or_else(|| Value::Object(payload.clone()).to_string());

            let mut text = format!("[{}] (Score: {:.4})\n{}", i + 1, point.score, content);
            if options.include_metadata {
                if let Some(metadata) =
                    payload.get(&options.metadata_payload_key).filter(|v| truthy(v))
                {
                    text.push_str(&format!("\nMetadata: {metadata}"));
                }
            }
            text
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
