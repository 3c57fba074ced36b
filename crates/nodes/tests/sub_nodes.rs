//! Model, observability and tool sub-nodes driven through a mock host.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use common::*;
use flowlm_core::error::ProviderError;
use flowlm_core::{CallbackHandler, ChatModel, Embeddings};
use flowlm_nodes::nodes::{
    LangfuseObservabilityNode, ModelNode, QdrantFlavor, QdrantSearchNode, find_model_node,
};
use flowlm_nodes::{ConnectionData, ConnectionType, Node, NodeError, NodeRegistry, SupplyData};
use flowlm_observability::LoggingHandler;
use serde_json::{Value, json};

fn supplied_model(supplied: SupplyData) -> ChatModel {
    match supplied.response {
        ConnectionData::Model(model) => model,
        _ => panic!("expected a model"),
    }
}

fn node(name: &str) -> ModelNode {
    ModelNode::new(find_model_node(name).unwrap())
}

// ── Model nodes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn openai_node_reads_the_model_locator() {
    let host = MockHost::new(vec![json!({})])
        .param("model", json!({"mode": "list", "value": "gpt-4o"}))
        .param("options", json!({"temperature": 0.2, "maxTokens": -1}))
        .credential("openAiApi", json!({"apiKey": "sk-test"}));

    let model = supplied_model(node("lmChatOpenAi").supply_data(&host, 0).await.unwrap());
    assert_eq!(model.settings().model, "gpt-4o");
    assert_eq!(model.settings().temperature, Some(0.2));
    assert_eq!(model.settings().max_tokens, None);
    assert_eq!(model.callback_names(), vec!["logging"]);
}

#[tokio::test]
async fn bedrock_custom_model_id_wins_when_enabled() {
    let host = MockHost::new(vec![json!({})])
        .param("useCustomModel", json!(true))
        .param("customModelId", json!("arn:aws:bedrock:us-east-1:123:inference-profile/x"))
        .credential(
            "awsBedrockApi",
            json!({"region": "us-east-1", "accessKeyId": "AKIA", "secretAccessKey": "secret"}),
        );

    let model = supplied_model(node("lmChatAwsBedrock").supply_data(&host, 0).await.unwrap());
    assert_eq!(model.settings().model, "arn:aws:bedrock:us-east-1:123:inference-profile/x");
}

#[tokio::test]
async fn langfuse_model_node_prepends_langfuse_and_merges_metadata() {
    let host = MockHost::new(vec![json!({})])
        .param("langfuseMetadata", json!({"customMetadata": "{\"team\": \"ai\"}"}))
        .credential(
            "anthropicApiWithLangfuseApi",
            json!({
                "apiKey": "sk-ant",
                "langfuseBaseUrl": "http://127.0.0.1:3000",
                "langfusePublicKey": "pk-lf",
                "langfuseSecretKey": "sk-lf"
            }),
        );

    let supplied = node("lmChatAnthropicLangfuse").supply_data(&host, 0).await.unwrap();
    let model = supplied_model(supplied);
    assert_eq!(model.callback_names(), vec!["langfuse", "logging"]);
    assert_eq!(model.metadata()["team"], "ai");
    assert_eq!(model.settings().model, "claude-3-5-sonnet-latest");
}

#[tokio::test]
async fn langfuse_model_node_needs_langfuse_keys() {
    let host = MockHost::new(vec![json!({})])
        .credential("groqApiWithLangfuseApi", json!({"apiKey": "gsk"}));

    let err = node("lmChatGroqLangfuse").supply_data(&host, 0).await.err().unwrap();
    assert!(matches!(err, NodeError::MissingCredential(_)));
    assert!(err.to_string().contains("publicKey"));
}

#[tokio::test]
async fn missing_credential_is_reported_by_type() {
    let host = MockHost::new(vec![json!({})]);
    let err = node("lmChatMistral").supply_data(&host, 0).await.err().unwrap();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("mistralApi"));
}

#[tokio::test]
async fn azure_node_needs_a_deployment_name() {
    let host = MockHost::new(vec![json!({})]).credential(
        "azureOpenAiApi",
        json!({"apiKey": "az", "resourceName": "acme", "apiVersion": "2024-06-01"}),
    );

    let err = node("lmChatAzureOpenAi").supply_data(&host, 0).await.err().unwrap();
    assert!(matches!(err, NodeError::Configuration(_)));
}

#[tokio::test]
async fn every_model_node_supplies_a_model_with_defaults() {
    let registry = NodeRegistry::with_defaults();
    let credentials = json!({
        "apiKey": "k",
        "url": "http://127.0.0.1:9",
        "baseUrl": "http://127.0.0.1:9",
        "resourceName": "acme",
        "apiVersion": "2024-06-01",
        "region": "us-east-1",
        "accessKeyId": "AKIA",
        "secretAccessKey": "secret",
        "langfusePublicKey": "pk",
        "langfuseSecretKey": "sk"
    });

    for spec in flowlm_nodes::nodes::MODEL_NODES {
        let mut host =
            MockHost::new(vec![json!({})]).credential(spec.credential, credentials.clone());
        if spec.name.starts_with("lmChatAzureOpenAi") {
            host = host.param("deploymentName", json!("gpt4o-prod"));
        }
        if spec.name == "lmChatVllm" {
            host = host.param("model", json!("meta-llama/Llama-3.1-8B-Instruct"));
        }
        let node = registry.get(spec.name).unwrap();
        let supplied = node.supply_data(&host, 0).await;
        assert!(supplied.is_ok(), "{} failed: {:?}", spec.name, supplied.err());
    }
}

// ── Langfuse wrapper ─────────────────────────────────────────────────────

#[tokio::test]
async fn wrapper_keeps_existing_handlers_after_langfuse() {
    let provider = ScriptedProvider::new(vec![text("ok")]);
    let logging: Arc<dyn CallbackHandler> = Arc::new(LoggingHandler::new());
    let upstream = model_over(&provider).with_handler(logging);
    let host = MockHost::new(vec![json!({})])
        .param(
            "langfuseMetadata",
            json!({"traceName": "support-bot", "customMetadata": "not json", "tags": "a, b"}),
        )
        .credential(
            "langfuseApi",
            json!({"publicKey": "pk", "secretKey": "sk", "baseUrl": "http://127.0.0.1:3000"}),
        )
        .connect(
            ConnectionType::LanguageModel,
            ConnectionData::Supplied(Box::new(SupplyData::new(ConnectionData::Model(upstream)))),
        );

    let model = supplied_model(LangfuseObservabilityNode.supply_data(&host, 0).await.unwrap());
    assert_eq!(model.callback_names(), vec!["langfuse", "logging"]);
    assert_eq!(model.metadata()["trace_name"], "support-bot");
    assert_eq!(model.metadata()["_raw"], "not json");
}

#[tokio::test]
async fn wrapper_without_model_is_a_missing_connection() {
    let host = MockHost::new(vec![json!({})])
        .credential("langfuseApi", json!({"publicKey": "pk", "secretKey": "sk"}));
    let err = LangfuseObservabilityNode.supply_data(&host, 0).await.err().unwrap();
    assert!(matches!(err, NodeError::MissingConnection(_)));
}

// ── Qdrant tools ─────────────────────────────────────────────────────────

struct FixedEmbeddings;

#[async_trait]
impl Embeddings for FixedEmbeddings {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

#[derive(Clone, Default)]
struct Searches(Arc<Mutex<Vec<(String, Value)>>>);

async fn search(
    State(searches): State<Searches>,
    Path(collection): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    searches.0.lock().unwrap().push((collection, body));
    Json(json!({
        "result": [
            {
                "id": 1,
                "score": 0.91234,
                "payload": {"content": "Refunds take 5 days", "metadata": {"source": "faq"}}
            }
        ],
        "status": "ok",
        "time": 0.001
    }))
}

async fn serve_qdrant() -> (String, Searches) {
    let searches = Searches::default();
    let app = Router::new()
        .route("/collections/{collection}/points/search", post(search))
        .with_state(searches.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), searches)
}

fn embeddings() -> ConnectionData {
    ConnectionData::Embeddings(Arc::new(FixedEmbeddings))
}

#[tokio::test]
async fn phoenix_search_tool_formats_hits() {
    let (qdrant, searches) = serve_qdrant().await;
    let (collector, captured) = serve_vendor().await;
    let host = MockHost::new(vec![json!({})])
        .param("toolName", json!("kb_search"))
        .param("collectionName", json!("docs"))
        .param("options", json!({"topK": 2, "searchFilterJson": "{\"must\": []}"}))
        .param("phoenixOptions", json!({"sessionId": "s-9"}))
        .credential(
            "qdrantPhoenixApi",
            json!({"qdrantUrl": qdrant, "phoenixCollectorUrl": format!("{collector}/v1/traces")}),
        )
        .connect(ConnectionType::Embedding, embeddings());

    let supplied = QdrantSearchNode::new(QdrantFlavor::Phoenix)
        .supply_data(&host, 0)
        .await
        .unwrap();
    let ConnectionData::Tool(tool) = supplied.response else {
        panic!("expected a tool");
    };
    assert_eq!(tool.name(), "kb_search");

    let result = tool.execute(json!({"input": "refunds"})).await.unwrap();
    assert_eq!(
        result.output,
        "[1] (Score: 0.9123)\nRefunds take 5 days\nMetadata: {\"source\":\"faq\"}"
    );

    let searches = searches.0.lock().unwrap().clone();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].0, "docs");
    assert_eq!(searches[0].1["limit"], 2);
    assert_eq!(searches[0].1["filter"], json!({"must": []}));
    assert_eq!(captured.bodies("/v1/traces").len(), 1);
}

#[tokio::test]
async fn langfuse_search_tool_needs_embeddings() {
    let host = MockHost::new(vec![json!({})])
        .param("collectionName", json!("docs"))
        .credential(
            "qdrantOpenAiLangfuseApi",
            json!({
                "qdrantUrl": "http://127.0.0.1:6333",
                "langfusePublicKey": "pk",
                "langfuseSecretKey": "sk"
            }),
        );

    let err = QdrantSearchNode::new(QdrantFlavor::Langfuse)
        .supply_data(&host, 0)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, NodeError::MissingConnection(_)));
    assert_eq!(err.to_string(), "No embedding model connected");
}

#[tokio::test]
async fn bad_search_filter_is_a_configuration_error() {
    let host = MockHost::new(vec![json!({})])
        .param("collectionName", json!("docs"))
        .param("options", json!({"searchFilterJson": "{not json"}))
        .credential("qdrantPhoenixApi", json!({"qdrantUrl": "http://127.0.0.1:6333"}))
        .connect(ConnectionType::Embedding, embeddings());

    let err = QdrantSearchNode::new(QdrantFlavor::Phoenix)
        .supply_data(&host, 0)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, NodeError::Configuration(ref m) if m == "Invalid JSON in Search Filter"));
}

#[tokio::test]
async fn helicone_search_tool_builds_its_own_embeddings() {
    let host = MockHost::new(vec![json!({})])
        .param("collectionName", json!("docs"))
        .credential(
            "qdrantHeliconeApi",
            json!({
                "qdrantUrl": "http://127.0.0.1:6333",
                "openaiApiKey": "sk",
                "heliconeApiKey": "hk"
            }),
        );

    let supplied = QdrantSearchNode::new(QdrantFlavor::Helicone)
        .supply_data(&host, 0)
        .await
        .unwrap();
    let ConnectionData::Tool(tool) = supplied.response else {
        panic!("expected a tool");
    };
    assert_eq!(tool.name(), "qdrant_search");
}

#[tokio::test]
async fn helicone_search_tool_needs_the_openai_key() {
    let host = MockHost::new(vec![json!({})])
        .param("collectionName", json!("docs"))
        .credential(
            "qdrantHeliconeApi",
            json!({"qdrantUrl": "http://127.0.0.1:6333", "heliconeApiKey": "hk"}),
        );

    let err = QdrantSearchNode::new(QdrantFlavor::Helicone)
        .supply_data(&host, 0)
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("openaiApiKey"));
}
