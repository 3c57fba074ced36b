//! Qdrant search tool sub-nodes.
//!
//! The three nodes share their parameters and differ in where the query
//! embedding comes from and how each search is traced:
//!
//! | Node | Embeddings | Tracing |
//! |---|---|---|
//! | `toolQdrantSearchLangfuse` | connected sub-node | Langfuse trace per search |
//! | `toolQdrantSearchPhoenix` | connected sub-node | Phoenix span per search |
//! | `toolQdrantSearchHelicone` | OpenAI through the Helicone proxy | proxy headers |

use std::sync::Arc;

use async_trait::async_trait;
use flowlm_core::{CredentialBag, Embeddings, Tool, Tracer};
use flowlm_observability::helicone::{HeliconeOptions, OPENAI_PROXY_URL, helicone_headers};
use flowlm_observability::{
    LangfuseClient, LangfuseConfig, PhoenixConfig, PhoenixTracer, TraceOptions,
};
use flowlm_providers::build_openai_embeddings;
use flowlm_tools::qdrant::{DEFAULT_DESCRIPTION, DEFAULT_TOOL_NAME};
use flowlm_tools::{QdrantClient, QdrantSearchTool, SearchOptions, SearchTracing};
use tracing::debug;

use crate::connections;
use crate::description::{NodeDescription, NodeParameter, Port};
use crate::error::NodeError;
use crate::host::{
    ConnectionData, ConnectionType, NodeContext, Params, SupplyData, client_options, http_client,
};
use crate::node::Node;

pub const PHOENIX_SERVICE_NAME: &str = "flowlm-qdrant-search-phoenix";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QdrantFlavor {
    Langfuse,
    Phoenix,
    Helicone,
}

impl QdrantFlavor {
    pub const ALL: [QdrantFlavor; 3] = [
        QdrantFlavor::Langfuse,
        QdrantFlavor::Phoenix,
        QdrantFlavor::Helicone,
    ];

    pub fn node_name(self) -> &'static str {
        match self {
            QdrantFlavor::Langfuse => "toolQdrantSearchLangfuse",
            QdrantFlavor::Phoenix => "toolQdrantSearchPhoenix",
            QdrantFlavor::Helicone => "toolQdrantSearchHelicone",
        }
    }

    pub fn credential(self) -> &'static str {
        match self {
            QdrantFlavor::Langfuse => "qdrantOpenAiLangfuseApi",
            QdrantFlavor::Phoenix => "qdrantPhoenixApi",
            QdrantFlavor::Helicone => "qdrantHeliconeApi",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            QdrantFlavor::Langfuse => "Qdrant Search Tool Langfuse",
            QdrantFlavor::Phoenix => "Qdrant Search Tool Phoenix",
            QdrantFlavor::Helicone => "Qdrant Search Tool Helicone",
        }
    }

    fn summary(self) -> &'static str {
        match self {
            QdrantFlavor::Langfuse => "Search Qdrant vector store with Langfuse embedding tracing",
            QdrantFlavor::Phoenix => "Search Qdrant vector store with Arize Phoenix tracing",
            QdrantFlavor::Helicone => {
                "Search Qdrant vector store with OpenAI embeddings tracked by Helicone"
            }
        }
    }

    /// The collection parameter carrying trace attributes.
    fn trace_parameter(self) -> NodeParameter {
        let session = NodeParameter::string("sessionId", "Session ID", "");
        let user = NodeParameter::string("userId", "User ID", "");
        match self {
            QdrantFlavor::Langfuse => NodeParameter::collection(
                "langfuseOptions",
                "Langfuse Options",
                vec![
                    session,
                    user,
                    NodeParameter::string("tags", "Tags", "").describe("Comma-separated"),
                ],
            ),
            QdrantFlavor::Phoenix => {
                NodeParameter::collection("phoenixOptions", "Phoenix Options", vec![session, user])
            }
            QdrantFlavor::Helicone => NodeParameter::collection(
                "heliconeOptions",
                "Helicone Options",
                vec![session, user],
            ),
        }
    }
}

fn search_option_parameters() -> Vec<NodeParameter> {
    vec![
        NodeParameter::string("contentPayloadKey", "Content Payload Key", "content"),
        NodeParameter::boolean("includeMetadata", "Include Metadata", true),
        NodeParameter::string("metadataPayloadKey", "Metadata Payload Key", "metadata"),
        NodeParameter::number("scoreThreshold", "Score Threshold", 0)
            .describe("Minimum similarity score; 0 disables the threshold"),
        NodeParameter::json("searchFilterJson", "Search Filter (JSON)", ""),
        NodeParameter::number("topK", "Top K", 4).describe("Number of results to return"),
    ]
}

pub struct QdrantSearchNode {
    flavor: QdrantFlavor,
}

impl QdrantSearchNode {
    pub fn new(flavor: QdrantFlavor) -> Self {
        Self { flavor }
    }

    pub fn all() -> impl Iterator<Item = QdrantSearchNode> {
        QdrantFlavor::ALL.into_iter().map(QdrantSearchNode::new)
    }

    async fn connected_embeddings(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<Arc<dyn Embeddings>, NodeError> {
        connections::embeddings(ctx, item)
            .await
            .ok_or_else(|| NodeError::MissingConnection("No embedding model connected".into()))
    }

    fn helicone_embeddings(
        &self,
        ctx: &dyn NodeContext,
        params: &Params<'_>,
        credentials: &CredentialBag,
        tool_name: &str,
    ) -> Result<Arc<dyn Embeddings>, NodeError> {
        let options = HeliconeOptions::from_value(&params.collection("heliconeOptions"))
            .with_property("Tool", tool_name);
        let helicone_key = credentials.require("heliconeApiKey")?;
        let openai_key = credentials.require("openaiApiKey")?;
        let model = params.string("embeddingModel", DEFAULT_EMBEDDING_MODEL);

        let mut client = client_options(ctx).with_base_url(OPENAI_PROXY_URL);
        for (name, value) in helicone_headers(helicone_key, &options) {
            client = client.with_header(name, value);
        }
        Ok(Arc::new(build_openai_embeddings(openai_key, &model, &client)?))
    }

    fn tracing(
        &self,
        ctx: &dyn NodeContext,
        params: &Params<'_>,
        credentials: &CredentialBag,
    ) -> Result<SearchTracing, NodeError> {
        match self.flavor {
            QdrantFlavor::Langfuse => {
                let config = LangfuseConfig::from_credentials(credentials)?;
                let http = http_client(ctx, &config.base_url)?;
                Ok(SearchTracing::Langfuse {
                    client: Arc::new(LangfuseClient::new(config, http)),
                    options: TraceOptions::from_value(&params.collection("langfuseOptions")),
                })
            }
            QdrantFlavor::Phoenix => {
                let config = PhoenixConfig::from_credentials(credentials);
                let http = http_client(ctx, &config.collector_url)?;
                let tracer: Arc<dyn Tracer> =
                    Arc::new(PhoenixTracer::new(config, PHOENIX_SERVICE_NAME, http));
                let options = params.collection("phoenixOptions");
                let field = |key: &str| {
                    options
                        .get(key)
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                Ok(SearchTracing::Phoenix {
                    tracer,
                    session_id: field("sessionId"),
                    user_id: field("userId"),
                })
            }
            QdrantFlavor::Helicone => Ok(SearchTracing::None),
        }
    }

    /// Build the search tool for `item`.
    pub async fn build(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<QdrantSearchTool, NodeError> {
        let credentials = ctx.get_credentials(self.flavor.credential()).await?;
        let params = Params::new(ctx, item);

        let tool_name = params.string("toolName", DEFAULT_TOOL_NAME);
        let description = params.string("toolDescription", DEFAULT_DESCRIPTION);
        let collection = params.string("collectionName", "");
        if collection.trim().is_empty() {
            return Err(NodeError::Configuration("Collection Name is required".into()));
        }
        let options = SearchOptions::from_value(&params.collection("options"))
            .map_err(NodeError::Configuration)?;

        let embeddings = match self.flavor {
            QdrantFlavor::Helicone => {
                self.helicone_embeddings(ctx, &params, &credentials, &tool_name)?
            }
            _ => self.connected_embeddings(ctx, item).await?,
        };

        let qdrant_url = credentials.require("qdrantUrl")?.to_string();
        let mut client = QdrantClient::new(&qdrant_url, http_client(ctx, &qdrant_url)?);
        if let Some(api_key) = credentials.string("qdrantApiKey") {
            client = client.with_api_key(api_key);
        }

        debug!(
            node = self.flavor.node_name(),
            tool = %tool_name,
            collection = %collection,
            top_k = options.top_k,
            "Building Qdrant search tool"
        );

        Ok(QdrantSearchTool::new(collection, client, embeddings, options)
            .with_name(tool_name)
            .with_description(description)
            .with_tracing(self.tracing(ctx, &params, &credentials)?))
    }
}

#[async_trait]
impl Node for QdrantSearchNode {
    fn description(&self) -> NodeDescription {
        let mut description = NodeDescription::new(
            self.flavor.node_name(),
            self.flavor.display_name(),
            self.flavor.summary(),
        )
        .output(ConnectionType::Tool)
        .credential(self.flavor.credential(), true);
        if self.flavor != QdrantFlavor::Helicone {
            description =
                description.input(Port::single("Embedding", ConnectionType::Embedding, true));
        }

        description = description
            .property(NodeParameter::string("toolName", "Tool Name", DEFAULT_TOOL_NAME).required())
            .property(
                NodeParameter::string("toolDescription", "Tool Description", DEFAULT_DESCRIPTION)
                    .required(),
            )
            .property(NodeParameter::string("collectionName", "Collection Name", "").required());
        if self.flavor == QdrantFlavor::Helicone {
            description = description.property(
                NodeParameter::options(
                    "embeddingModel",
                    "Embedding Model",
                    DEFAULT_EMBEDDING_MODEL,
                    &[
                        ("text-embedding-3-small", "text-embedding-3-small"),
                        ("text-embedding-3-large", "text-embedding-3-large"),
                        ("text-embedding-ada-002", "text-embedding-ada-002"),
                    ],
                ),
            );
        }
        description
            .property(NodeParameter::collection("options", "Options", search_option_parameters()))
            .property(self.flavor.trace_parameter())
    }

    async fn supply_data(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<SupplyData, NodeError> {
        let tool: Arc<dyn Tool> = Arc::new(self.build(ctx, item).await?);
        Ok(SupplyData::new(ConnectionData::Tool(tool)))
    }
}
