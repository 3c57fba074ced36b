//! A tool assembled at runtime from a name, a schema and a closure.

use std::sync::Arc;

use async_trait::async_trait;
use flowlm_core::error::ToolError;
use flowlm_core::tool::{Tool, ToolResult};
use futures::future::BoxFuture;
use serde_json::{Value, json};

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// A tool whose behaviour is an async closure.
///
/// The closure receives the parsed arguments; a string result is the
/// observation as-is, anything else is rendered as JSON.
#[derive(Clone)]
pub struct DynamicTool {
    name: String,
    description: String,
    schema: Value,
    handler: Handler,
}

impl std::fmt::Debug for DynamicTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl DynamicTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "input": { "type": "string" }
                },
                "required": ["input"]
            }),
            handler: Arc::new(handler),
        }
    }

    /// Replace the default single-`input` schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for DynamicTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let value = (self.handler)(arguments).await?;
        Ok(ToolResult::from_value(value))
    }
}

/// The text argument of a single-input tool: the `input` or `query` field,
/// or the arguments themselves when the model sent a bare string.
pub fn text_argument(arguments: &Value) -> Option<String> {
    match arguments {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["input", "query"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn upper() -> DynamicTool {
        DynamicTool::new("upper", "Upper-cases text", |args: Value| {
            async move {
                let text = text_argument(&args)
                    .ok_or_else(|| ToolError::InvalidArguments("missing input".into()))?;
                Ok(Value::String(text.to_uppercase()))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn string_results_are_used_verbatim() {
        let result = upper().execute(json!({"input": "abc"})).await.unwrap();
        assert_eq!(result.output, "ABC");
    }

    #[tokio::test]
    async fn structured_results_become_json() {
        let tool = DynamicTool::new("sum", "Adds", |args: Value| {
            async move {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(json!({"sum": a + b}))
            }
            .boxed()
        })
        .with_schema(json!({"type": "object", "properties": {"a": {}, "b": {}}}));

        let result = tool.execute(json!({"a": 2, "b": 2})).await.unwrap();
        assert_eq!(result.output, r#"{"sum":4}"#);
        assert_eq!(tool.parameters_schema()["properties"]["a"], json!({}));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let err = upper().execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn text_argument_accepts_several_shapes() {
        assert_eq!(text_argument(&json!("q")), Some("q".into()));
        assert_eq!(text_argument(&json!({"query": "q"})), Some("q".into()));
        assert_eq!(text_argument(&json!({"input": "i", "query": "q"})), Some("i".into()));
        assert_eq!(text_argument(&json!(3)), None);
    }
}
