//! Export tests against a local capture server.
//!
//! A throwaway axum app stands in for the Langfuse ingestion API and the
//! Phoenix collector and records what each flush sends.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use flowlm_core::{SpanGuard, SpanStatus, Tracer};
use flowlm_observability::{
    LangfuseClient, LangfuseConfig, PhoenixConfig, PhoenixTracer, TraceOptions,
};
use serde_json::{Value, json};

// ── Capture server ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    status: Arc<Mutex<Option<StatusCode>>>,
}

async fn capture(
    State(state): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((auth, body));
    state.status.lock().unwrap().unwrap_or(StatusCode::OK)
}

async fn serve(state: Captured) -> String {
    let app = Router::new()
        .route("/api/public/ingestion", post(capture))
        .route("/v1/traces", post(capture))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Langfuse ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn langfuse_flush_posts_one_batch_with_basic_auth() {
    let state = Captured::default();
    let base = serve(state.clone()).await;
    let client = Arc::new(LangfuseClient::new(
        LangfuseConfig::new(&base, "pk-lf", "sk-lf"),
        reqwest::Client::new(),
    ));

    let options = TraceOptions {
        session_id: Some("s-1".into()),
        tags: Some(vec!["prod".into()]),
        ..Default::default()
    };
    let trace = client.trace("kb_search", &options);
    trace.span("embedding", json!({"query": "refunds"})).end(json!({"dimensions": 1536}));
    trace.update(json!("[1] (Score: 0.9000)\nRefunds take 5 days"), None);

    client.flush().await.unwrap();

    let requests = state.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert!(auth.as_deref().unwrap().starts_with("Basic "));
    let batch = body["batch"].as_array().unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0]["type"], "trace-create");
    assert_eq!(batch[0]["body"]["sessionId"], "s-1");
    assert_eq!(batch[0]["body"]["tags"][0], "prod");
    assert_eq!(batch[1]["type"], "span-create");

    // Nothing left to send.
    client.flush().await.unwrap();
    assert_eq!(state.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn langfuse_rejection_is_an_export_error() {
    let state = Captured::default();
    *state.status.lock().unwrap() = Some(StatusCode::UNAUTHORIZED);
    let base = serve(state.clone()).await;
    let client = Arc::new(LangfuseClient::new(
        LangfuseConfig::new(&base, "pk", "bad"),
        reqwest::Client::new(),
    ));
    client.trace("t", &TraceOptions::default());

    let err = client.flush().await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

// ── Phoenix ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn phoenix_flush_exports_spans_with_bearer_key() {
    let state = Captured::default();
    let base = serve(state.clone()).await;
    let tracer = PhoenixTracer::new(
        PhoenixConfig::new(format!("{base}/v1/traces"), "support").with_api_key("px-key"),
        "flowlm-agent-phoenix",
        reqwest::Client::new(),
    );

    let mut root = SpanGuard::start(&tracer, "llm_call", None);
    root.set("llm.provider", "openai");
    let iteration = SpanGuard::start(&tracer, "iteration_1", Some(root.context()));
    iteration.end(SpanStatus::Ok);
    root.end(SpanStatus::Ok);

    tracer.flush().await.unwrap();

    let requests = state.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer px-key"));
    let spans = body["resourceSpans"][0]["scopeSpans"][0]["spans"].as_array().unwrap();
    let names: Vec<&str> = spans.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["iteration_1", "llm_call"]);
    assert_eq!(spans[0]["parentSpanId"], spans[1]["spanId"]);
    assert!(tracer.finished_spans().is_empty());
}

#[tokio::test]
async fn phoenix_unreachable_collector_is_an_export_error() {
    let tracer = PhoenixTracer::new(
        PhoenixConfig::new("http://127.0.0.1:9/v1/traces", "default"),
        "flowlm-agent-phoenix",
        reqwest::Client::new(),
    );
    SpanGuard::start(&tracer, "llm_call", None).end(SpanStatus::Ok);
    assert!(tracer.flush().await.is_err());
}
