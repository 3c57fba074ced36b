//! JSON output parser.

use async_trait::async_trait;
use flowlm_core::OutputParser;
use flowlm_core::error::ParseError;
use serde_json::Value;

/// Parses the model's final text as JSON.
///
/// Markdown code fences (```` ```json ````) around the payload are
/// stripped first.
#[derive(Debug, Default, Clone)]
pub struct JsonOutputParser;

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[async_trait]
impl OutputParser for JsonOutputParser {
    fn name(&self) -> &str {
        "json"
    }

    async fn parse(&self, text: &str) -> Result<Value, ParseError> {
        serde_json::from_str(strip_fences(text)).map_err(|e| ParseError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn parses_plain_and_fenced_json() {
        let parser = JsonOutputParser;
        assert_eq!(parser.parse(r#"{"answer": 4}"#).await.unwrap(), json!({"answer": 4}));
        assert_eq!(
            parser.parse("```json\n{\"answer\": 4}\n```").await.unwrap(),
            json!({"answer": 4})
        );
    }

    #[tokio::test]
    async fn prose_is_rejected() {
        assert!(JsonOutputParser.parse("The answer is 4.").await.is_err());
    }
}
