//! Minimal Qdrant REST client: point search only.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

/// One scored point returned by a search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    #[serde(default)]
    pub id: Value,
    pub score: f64,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

/// A search request against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    /// Only sent when positive
    pub score_threshold: f64,
    pub filter: Option<Value>,
}

impl SearchRequest {
    pub(crate) fn body(&self) -> Value {
        let mut body = json!({
            "vector": self.vector,
            "limit": self.limit,
            "with_payload": true,
        });
        if self.score_threshold > 0.0 {
            body["score_threshold"] = json!(self.score_threshold);
        }
        if let Some(filter) = &self.filter {
            body["filter"] = filter.clone();
        }
        body
    }
}

/// Talks to `{url}/collections/{name}/points/search`.
#[derive(Clone)]
pub struct QdrantClient {
    url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for QdrantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantClient")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl QdrantClient {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http,
            timeout: None,
        }
    }

    /// Sent as the `api-key` header; empty keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn search(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> Result<Vec<ScoredPoint>, String> {
        let url = format!("{}/collections/{}/points/search", self.url, collection);
        debug!(url = %url, limit = request.limit, "Searching Qdrant");

        let mut builder = self.http.post(&url).json(&request.body());
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Qdrant returned {status}: {body}"));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Qdrant response: {e}"))?;
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_is_omitted() {
        let request = SearchRequest {
            vector: vec![0.1, 0.2],
            limit: 4,
            score_threshold: 0.0,
            filter: None,
        };
        let body = request.body();
        assert_eq!(body["limit"], 4);
        assert_eq!(body["with_payload"], true);
        assert!(body.get("score_threshold").is_none());
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn threshold_and_filter_are_sent() {
        let request = SearchRequest {
            vector: vec![0.1],
            limit: 2,
            score_threshold: 0.5,
            filter: Some(json!({"must": [{"key": "lang", "match": {"value": "en"}}]})),
        };
        let body = request.body();
        assert_eq!(body["score_threshold"], 0.5);
        assert_eq!(body["filter"]["must"][0]["key"], "lang");
    }

    #[test]
    fn debug_hides_api_key() {
        let client = QdrantClient::new("http://localhost:6333/", reqwest::Client::new())
            .with_api_key("secret");
        assert_eq!(client.url(), "http://localhost:6333");
        assert!(!format!("{client:?}").contains("secret"));
    }
}
