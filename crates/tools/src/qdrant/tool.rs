//! The Qdrant search tool exposed to agents.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use flowlm_core::error::ToolError;
use flowlm_core::tool::{Tool, ToolResult};
use flowlm_core::{Embeddings, SpanGuard, SpanStatus, Tracer};
use flowlm_observability::phoenix::truncate_output;
use flowlm_observability::{LangfuseClient, TraceOptions};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::client::{QdrantClient, ScoredPoint, SearchRequest};
use super::format::{SearchOptions, format_results};
use crate::dynamic::text_argument;

pub const DEFAULT_TOOL_NAME: &str = "qdrant_search";
pub const DEFAULT_DESCRIPTION: &str = "Search for relevant documents in the knowledge base. \
Use this tool when you need to find information about a specific topic.";

/// Where each search is traced.
#[derive(Clone, Default)]
pub enum SearchTracing {
    #[default]
    None,
    /// One Langfuse trace per search with `embedding` and `qdrant_search` spans
    Langfuse {
        client: Arc<LangfuseClient>,
        options: TraceOptions,
    },
    /// A `<tool>_search` span per search with the same two children
    Phoenix {
        tracer: Arc<dyn Tracer>,
        session_id: Option<String>,
        user_id: Option<String>,
    },
}

/// Embeds the query, searches one collection and formats the hits.
///
/// Failures never surface as tool errors: the model receives
/// `Error searching Qdrant: <reason>` as the observation instead.
pub struct QdrantSearchTool {
    name: String,
    description: String,
    collection: String,
    client: QdrantClient,
    embeddings: Arc<dyn Embeddings>,
    options: SearchOptions,
    tracing: SearchTracing,
}

impl QdrantSearchTool {
    pub fn new(
        collection: impl Into<String>,
        client: QdrantClient,
        embeddings: Arc<dyn Embeddings>,
        options: SearchOptions,
    ) -> Self {
        Self {
            name: DEFAULT_TOOL_NAME.into(),
            description: DEFAULT_DESCRIPTION.into(),
            collection: collection.into(),
            client,
            embeddings,
            options,
            tracing: SearchTracing::None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tracing(mut self, tracing: SearchTracing) -> Self {
        self.tracing = tracing;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, String> {
        self.embeddings.embed_query(query).await.map_err(|e| e.to_string())
    }

    async fn search(&self, vector: Vec<f32>) -> Result<Vec<ScoredPoint>, String> {
        let request = SearchRequest {
            vector,
            limit: self.options.top_k,
            score_threshold: self.options.score_threshold,
            filter: self.options.filter.clone(),
        };
        self.client.search(&self.collection, &request).await
    }

    fn search_input(&self) -> Value {
        json!({
            "collection": self.collection,
            "topK": self.options.top_k,
            "scoreThreshold": self.options.score_threshold,
            "filter": self.options.filter,
        })
    }

    async fn run_plain(&self, query: &str) -> Result<String, String> {
        let vector = self.embed(query).await?;
        let points = self.search(vector).await?;
        Ok(format_results(&points, &self.options))
    }

    // --- Langfuse ---

    async fn run_langfuse(
        &self,
        query: &str,
        client: &Arc<LangfuseClient>,
        options: &TraceOptions,
    ) -> Result<String, String> {
        let mut trace_options = options.clone();
        trace_options.metadata.insert("collection".into(), json!(self.collection));
        trace_options.metadata.insert("topK".into(), json!(self.options.top_k));
        trace_options.metadata.insert("hasFilter".into(), json!(self.options.filter.is_some()));
        let trace = client.trace(&format!("{}_search", self.name), &trace_options);

        let result = async {
            let span = trace.span("embedding", json!({ "query": query }));
            let started = Instant::now();
            let vector = match self.embed(query).await {
                Ok(v) => v,
                Err(e) => {
                    span.fail(&e);
                    return Err(e);
                }
            };
            span.end(json!({
                "dimensions": vector.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }));

            let span = trace.span("qdrant_search", self.search_input());
            let started = Instant::now();
            let points = match self.search(vector).await {
                Ok(p) => p,
                Err(e) => {
                    span.fail(&e);
                    return Err(e);
                }
            };
            span.end(json!({
                "results_count": points.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }));
            Ok(format_results(&points, &self.options))
        }
        .await;

        match &result {
            Ok(output) => trace.update(json!(output), None),
            Err(e) => {
                let mut metadata = Map::new();
                metadata.insert("error".into(), json!(true));
                trace.update(json!(format!("Error: {e}")), Some(metadata));
            }
        }
        if let Err(e) = client.flush().await {
            warn!(tool = %self.name, error = %e, "Langfuse flush failed");
        }
        result
    }

    // --- Phoenix ---

    async fn run_phoenix(
        &self,
        query: &str,
        tracer: &Arc<dyn Tracer>,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<String, String> {
        let mut root = SpanGuard::start(tracer.as_ref(), &format!("{}_search", self.name), None);
        root.set("tool.name", self.name.as_str());
        root.set("collection", self.collection.as_str());
        root.set("topK", self.options.top_k as u64);
        if let Some(id) = session_id {
            root.set("session.id", id);
        }
        if let Some(id) = user_id {
            root.set("user.id", id);
        }
        let parent = root.context().clone();

        let result = async {
            let mut span = SpanGuard::start(tracer.as_ref(), "embedding", Some(&parent));
            span.set("input.query", query);
            let started = Instant::now();
            let vector = match self.embed(query).await {
                Ok(v) => v,
                Err(e) => {
                    span.end(SpanStatus::Error(e.clone()));
                    return Err(e);
                }
            };
            span.set("output.dimensions", vector.len() as u64);
            span.set("duration_ms", started.elapsed().as_millis() as u64);
            span.end(SpanStatus::Ok);

            let mut span = SpanGuard::start(tracer.as_ref(), "qdrant_search", Some(&parent));
            span.set("collection", self.collection.as_str());
            span.set("topK", self.options.top_k as u64);
            span.set("scoreThreshold", self.options.score_threshold);
            if let Some(filter) = &self.options.filter {
                span.set("filter", filter.to_string());
            }
            let started = Instant::now();
            let points = match self.search(vector).await {
                Ok(p) => p,
                Err(e) => {
                    span.end(SpanStatus::Error(e.clone()));
                    return Err(e);
                }
            };
            span.set("results_count", points.len() as u64);
            span.set("duration_ms", started.elapsed().as_millis() as u64);
            span.end(SpanStatus::Ok);
            Ok(format_results(&points, &self.options))
        }
        .await;

        match &result {
            Ok(output) => {
                root.set("output", truncate_output(output));
                root.end(SpanStatus::Ok);
            }
            Err(e) => root.end(SpanStatus::Error(e.clone())),
        }
        if let Err(e) = tracer.flush().await {
            warn!(tool = %self.name, error = %e, "Phoenix flush failed");
        }
        result
    }
}

#[async_trait]
impl Tool for QdrantSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "What to search the knowledge base for"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let query = text_argument(&arguments)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'input' argument".into()))?;
        debug!(tool = %self.name, collection = %self.collection, "Running vector search");

        let result = match &self.tracing {
            SearchTracing::None => self.run_plain(&query).await,
            SearchTracing::Langfuse { client, options } => {
                self.run_langfuse(&query, client, options).await
            }
            SearchTracing::Phoenix {
                tracer,
                session_id,
                user_id,
            } => {
                self.run_phoenix(&query, tracer, session_id.as_deref(), user_id.as_deref())
                    .await
            }
        };

        Ok(ToolResult::text(
            result.unwrap_or_else(|e| format!("Error searching Qdrant: {e}")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlm_core::error::ProviderError;

    struct FixedEmbeddings(Result<Vec<f32>, ProviderError>);

    #[async_trait]
    impl Embeddings for FixedEmbeddings {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            self.0.clone()
        }
    }

    fn tool(embeddings: FixedEmbeddings) -> QdrantSearchTool {
        QdrantSearchTool::new(
            "docs",
            QdrantClient::new("http://127.0.0.1:9", reqwest::Client::new()),
            Arc::new(embeddings),
            SearchOptions::default(),
        )
    }

    #[test]
    fn defaults_and_builders() {
        let t = tool(FixedEmbeddings(Ok(vec![0.1])))
            .with_name("kb")
            .with_description("Company handbook");
        assert_eq!(t.name(), "kb");
        assert_eq!(t.description(), "Company handbook");
        assert_eq!(t.collection(), "docs");
        assert_eq!(t.to_definition().parameters["required"][0], "input");
    }

    #[tokio::test]
    async fn embedding_failure_becomes_observation() {
        let t = tool(FixedEmbeddings(Err(ProviderError::AuthenticationFailed("bad key".into()))));
        let result = t.execute(json!({"input": "refunds"})).await.unwrap();
        assert!(result.output.starts_with("Error searching Qdrant: "));
        assert!(result.output.contains("bad key"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid_arguments() {
        let t = tool(FixedEmbeddings(Ok(vec![0.1])));
        assert!(matches!(
            t.execute(json!({})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
