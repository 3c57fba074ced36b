//! Provider table and the generic chat-model factory.
//!
//! Every supported provider is one row in [`PROVIDERS`]: the wire protocol,
//! the default endpoint, which credential fields carry the key and base URL,
//! and the sampling defaults used when node options leave a value unset.
//! [`build_chat_model`] turns a row, a credential bag and node options into a
//! [`ChatModel`]. Nothing here touches the network.

use std::sync::Arc;
use std::time::Duration;

use flowlm_config::HttpConfig;
use flowlm_core::error::ProviderError;
use flowlm_core::{ChatModel, CredentialBag, ModelSettings, Provider, ProviderEmbeddings};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::bedrock::{AwsCredentials, BedrockProvider};
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai_compat::{AuthStyle, OpenAiCompatProvider, PathStyle};
use crate::proxy::{ProxySettings, shared_clients};
use crate::retry::RetryProvider;

/// Request/response dialect spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Gemini,
    Ollama,
    Bedrock,
}

/// One row of the provider table.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub protocol: Protocol,
    /// Endpoint used when neither options nor credentials name one
    pub default_base_url: &'static str,
    /// Credential fields consulted, in order, for a base URL
    pub base_url_fields: &'static [&'static str],
    pub api_key_field: &'static str,
    pub api_key_required: bool,
    /// Key sent when the credential carries none (self-hosted servers)
    pub api_key_fallback: Option<&'static str>,
    pub default_model: &'static str,
    pub default_temperature: f32,
    pub default_max_tokens: Option<u32>,
    pub default_top_p: Option<f32>,
    pub default_top_k: Option<u32>,
    pub default_max_retries: u32,
}

const fn spec(
    id: &'static str,
    display_name: &'static str,
    protocol: Protocol,
    default_base_url: &'static str,
    default_model: &'static str,
) -> ProviderSpec {
    ProviderSpec {
        id,
        display_name,
        protocol,
        default_base_url,
        base_url_fields: &[],
        api_key_field: "apiKey",
        api_key_required: true,
        api_key_fallback: None,
        default_model,
        default_temperature: 0.7,
        default_max_tokens: None,
        default_top_p: None,
        default_top_k: None,
        default_max_retries: 0,
    }
}

/// Every provider a node can select.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        base_url_fields: &["url", "baseUrl"],
        default_max_retries: 2,
        ..spec("openai", "OpenAI", Protocol::OpenAi, "https://api.openai.com/v1", "gpt-4o-mini")
    },
    ProviderSpec {
        base_url_fields: &["endpoint"],
        default_max_retries: 2,
        ..spec("azureOpenai", "Azure OpenAI", Protocol::AzureOpenAi, "", "gpt-4o-mini")
    },
    ProviderSpec {
        base_url_fields: &["url"],
        default_max_tokens: Some(4096),
        ..spec(
            "anthropic",
            "Anthropic",
            Protocol::Anthropic,
            crate::anthropic::DEFAULT_BASE_URL,
            "claude-3-5-sonnet-latest",
        )
    },
    ProviderSpec {
        api_key_field: "accessKeyId",
        default_max_tokens: Some(2000),
        ..spec(
            "bedrock",
            "AWS Bedrock",
            Protocol::Bedrock,
            "",
            "anthropic.claude-3-5-sonnet-20241022-v2:0",
        )
    },
    ProviderSpec {
        default_max_tokens: Some(2048),
        default_top_k: Some(40),
        default_top_p: Some(0.95),
        ..spec(
            "gemini",
            "Google Gemini",
            Protocol::Gemini,
            crate::gemini::DEFAULT_BASE_URL,
            "gemini-2.0-flash",
        )
    },
    ProviderSpec {
        default_max_tokens: Some(4096),
        ..spec(
            "groq",
            "Groq",
            Protocol::OpenAi,
            "https://api.groq.com/openai/v1",
            "llama-3.3-70b-versatile",
        )
    },
    ProviderSpec {
        default_max_tokens: Some(4096),
        default_max_retries: 2,
        ..spec(
            "mistral",
            "Mistral AI",
            Protocol::OpenAi,
            "https://api.mistral.ai/v1",
            "mistral-small-latest",
        )
    },
    ProviderSpec {
        default_temperature: 0.3,
        default_max_retries: 2,
        ..spec(
            "cohere",
            "Cohere",
            Protocol::OpenAi,
            "https://api.cohere.ai/compatibility/v1",
            "command-r-plus",
        )
    },
    ProviderSpec {
        base_url_fields: &["baseUrl"],
        api_key_required: false,
        default_top_k: Some(40),
        default_top_p: Some(0.9),
        ..spec("ollama", "Ollama", Protocol::Ollama, crate::ollama::DEFAULT_BASE_URL, "llama3.2")
    },
    ProviderSpec {
        base_url_fields: &["baseUrl"],
        api_key_required: false,
        api_key_fallback: Some("dummy-key"),
        default_max_tokens: Some(4096),
        default_max_retries: 2,
        ..spec("vllm", "vLLM", Protocol::OpenAi, "http://localhost:8000/v1", "")
    },
    ProviderSpec {
        default_max_tokens: Some(4096),
        ..spec("grok", "xAI Grok", Protocol::OpenAi, "https://api.x.ai/v1", "grok-2-1212")
    },
    ProviderSpec {
        base_url_fields: &["baseUrl", "url"],
        api_key_required: false,
        ..spec("openaiCompatible", "OpenAI Compatible", Protocol::OpenAi, "", "")
    },
];

/// Look up a provider row by id.
pub fn find_provider(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// Generation options as node parameters carry them.
///
/// Integer limits use `-1` for "leave it to the provider".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<i64>,
    pub max_output_tokens: Option<i64>,
    pub num_predict: Option<i64>,
    pub top_p: Option<f32>,
    pub top_k: Option<i64>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    /// Per-request timeout in milliseconds
    pub timeout: Option<u64>,
    pub max_retries: Option<u32>,
    #[serde(rename = "baseURL", alias = "baseUrl")]
    pub base_url: Option<String>,
    pub response_format: Option<String>,
    pub reasoning_effort: Option<String>,
    pub thinking: Option<bool>,
    pub thinking_budget: Option<u32>,
    pub num_ctx: Option<i64>,
    pub keep_alive: Option<String>,
    pub repeat_penalty: Option<f32>,
    pub format: Option<String>,
    pub safe_mode: Option<bool>,
    /// Comma-separated stop sequences
    pub stop: Option<String>,
}

impl ModelOptions {
    /// Read options from a node's `options` collection; unknown keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ProviderError::NotConfigured(format!("Invalid model options: {e}")))
    }

    fn token_limit(&self) -> Option<i64> {
        self.max_tokens.or(self.max_output_tokens).or(self.num_predict)
    }
}

/// Transport settings shared by every client a factory call builds.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub http: HttpConfig,
    pub proxy: ProxySettings,
    /// Replaces every other base URL source (observability gateways)
    pub base_url: Option<String>,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl ClientOptions {
    /// Settings with the proxy variables of the current process.
    pub fn from_env(http: HttpConfig) -> Self {
        Self {
            http,
            proxy: ProxySettings::from_env(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn positive(limit: Option<i64>) -> Option<Option<u32>> {
    limit.map(|v| u32::try_from(v).ok().filter(|v| *v > 0))
}

fn credential_error(e: flowlm_core::error::CredentialError) -> ProviderError {
    ProviderError::NotConfigured(e.to_string())
}

/// Sampling settings for `spec`, options winning over table defaults.
pub fn resolve_settings(spec: &ProviderSpec, model: &str, options: &ModelOptions) -> ModelSettings {
    let mut settings = ModelSettings::new(if model.trim().is_empty() {
        spec.default_model
    } else {
        model.trim()
    });

    settings.temperature = Some(options.temperature.unwrap_or(spec.default_temperature));
    settings.max_tokens = positive(options.token_limit()).unwrap_or(spec.default_max_tokens);
    settings.top_p = options.top_p.or(spec.default_top_p);
    settings.top_k = positive(options.top_k).unwrap_or(spec.default_top_k);
    if let Some(stop) = &options.stop {
        settings.stop = stop
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    let extra = &mut settings.extra;
    match spec.protocol {
        Protocol::OpenAi | Protocol::AzureOpenAi => {
            if let Some(p) = options.frequency_penalty {
                extra.insert("frequency_penalty".into(), json!(p));
            }
            if let Some(p) = options.presence_penalty {
                extra.insert("presence_penalty".into(), json!(p));
            }
            if options.response_format.as_deref() == Some("json_object") {
                extra.insert("response_format".into(), json!({"type": "json_object"}));
            }
            if let Some(effort) = options.reasoning_effort.as_deref().filter(|e| !e.is_empty()) {
                extra.insert("reasoning_effort".into(), json!(effort));
            }
            if options.safe_mode == Some(true) {
                extra.insert("safe_prompt".into(), json!(true));
            }
        }
        Protocol::Ollama => {
            let mut ollama = serde_json::Map::new();
            if let Some(num_ctx) = options.num_ctx.filter(|n| *n > 0) {
                ollama.insert("num_ctx".into(), json!(num_ctx));
            }
            if let Some(penalty) = options.repeat_penalty {
                ollama.insert("repeat_penalty".into(), json!(penalty));
            }
            if !ollama.is_empty() {
                extra.insert("options".into(), Value::Object(ollama));
            }
            if let Some(keep_alive) = options.keep_alive.as_deref().filter(|k| !k.is_empty()) {
                extra.insert("keep_alive".into(), json!(keep_alive));
            }
            if options.format.as_deref() == Some("json") {
                extra.insert("format".into(), json!("json"));
            }
        }
        Protocol::Anthropic => {
            if options.thinking == Some(true) {
                settings.temperature = None;
                settings.top_k = None;
                settings.top_p = None;
            }
        }
        Protocol::Gemini | Protocol::Bedrock => {}
    }

    settings
}

fn base_url(
    spec: &ProviderSpec,
    credentials: &CredentialBag,
    options: &ModelOptions,
    client: &ClientOptions,
) -> String {
    client
        .base_url
        .clone()
        .or_else(|| options.base_url.clone().filter(|u| !u.trim().is_empty()))
        .or_else(|| {
            spec.base_url_fields
                .iter()
                .find_map(|f| credentials.string(f))
                .map(str::to_string)
        })
        .unwrap_or_else(|| spec.default_base_url.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn azure_base_url(
    credentials: &CredentialBag,
    client: &ClientOptions,
) -> Result<String, ProviderError> {
    if let Some(url) = &client.base_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let endpoint = match credentials.string("endpoint") {
        Some(e) if e.starts_with("http") => e.trim_end_matches('/').to_string(),
        Some(instance) => format!("https://{instance}.openai.azure.com"),
        None => {
            let resource = credentials.require("resourceName").map_err(credential_error)?;
            format!("https://{resource}.openai.azure.com")
        }
    };
    Ok(format!("{endpoint}/openai/deployments"))
}

fn api_key(
    spec: &ProviderSpec,
    credentials: &CredentialBag,
) -> Result<Option<String>, ProviderError> {
    if spec.api_key_required {
        return credentials
            .require(spec.api_key_field)
            .map(|k| Some(k.to_string()))
            .map_err(credential_error);
    }
    Ok(credentials
        .string(spec.api_key_field)
        .or(spec.api_key_fallback)
        .map(str::to_string))
}

fn build_provider(
    spec: &ProviderSpec,
    credentials: &CredentialBag,
    settings: &ModelSettings,
    options: &ModelOptions,
    client_options: &ClientOptions,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let key = api_key(spec, credentials)?;
    let timeout = options.timeout.filter(|t| *t > 0).map(Duration::from_millis);
    let http_for =
        |url: &str| shared_clients().client_for(url, &client_options.proxy, &client_options.http);

    let provider: Arc<dyn Provider> = match spec.protocol {
        Protocol::OpenAi => {
            let url = base_url(spec, credentials, options, client_options);
            if url.is_empty() {
                return Err(ProviderError::NotConfigured(format!(
                    "Provider '{}' needs a base URL",
                    spec.id
                )));
            }
            let http = http_for(&url)?;
            let mut p = OpenAiCompatProvider::new(spec.id, url, http);
            if let Some(key) = key {
                p = p.with_api_key(key);
            }
            if let Some(org) = credentials.string("organizationId") {
                p = p.with_header("OpenAI-Organization", org);
            }
            for (name, value) in &client_options.headers {
                p = p.with_header(name, value);
            }
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
        Protocol::AzureOpenAi => {
            let url = azure_base_url(credentials, client_options)?;
            let http = http_for(&url)?;
            let mut p = OpenAiCompatProvider::new(spec.id, url, http)
                .with_auth(AuthStyle::Header("api-key".into()))
                .with_path_style(PathStyle::Deployment)
                .with_max_tokens_field("max_completion_tokens")
                .with_query(
                    "api-version",
                    credentials.string_or("apiVersion", "2024-02-15-preview"),
                );
            if let Some(key) = key {
                p = p.with_api_key(key);
            }
            for (name, value) in &client_options.headers {
                p = p.with_header(name, value);
            }
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
        Protocol::Anthropic => {
            let url = base_url(spec, credentials, options, client_options);
            let http = http_for(&url)?;
            let mut p = AnthropicProvider::new(key.unwrap_or_default(), http).with_base_url(url);
            if credentials.flag("customHeaders") {
                if let (Some(name), Some(value)) =
                    (credentials.string("headerName"), credentials.string("headerValue"))
                {
                    p = p.with_header(name, value);
                }
            }
            for (name, value) in &client_options.headers {
                p = p.with_header(name, value);
            }
            if options.thinking == Some(true) {
                p = p.with_extended_thinking(options.thinking_budget.unwrap_or(10_000));
            }
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
        Protocol::Gemini => {
            let url = base_url(spec, credentials, options, client_options);
            let http = http_for(&url)?;
            let mut p = GeminiProvider::new(key.unwrap_or_default(), http).with_base_url(url);
            for (name, value) in &client_options.headers {
                p = p.with_header(name, value);
            }
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
        Protocol::Ollama => {
            let url = base_url(spec, credentials, options, client_options);
            let http = http_for(&url)?;
            let mut p = OllamaProvider::new(url, http);
            if let Some(key) = key {
                p = p.with_api_key(key);
            }
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
        Protocol::Bedrock => {
            let region = credentials.string_or("region", "us-east-1");
            let aws = AwsCredentials {
                access_key_id: key.unwrap_or_default(),
                secret_access_key: credentials
                    .require("secretAccessKey")
                    .map_err(credential_error)?
                    .to_string(),
                session_token: credentials.string("sessionToken").map(str::to_string),
            };
            let endpoint = client_options
                .base_url
                .clone()
                .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));
            let http = http_for(&endpoint)?;
            let mut p = BedrockProvider::new(region, aws, http).with_endpoint(endpoint);
            if let Some(t) = timeout {
                p = p.with_timeout(t);
            }
            Arc::new(p)
        }
    };

    let retries = options.max_retries.unwrap_or(spec.default_max_retries);
    if retries == 0 {
        return Ok(provider);
    }
    let attempt_timeout = timeout.unwrap_or(Duration::from_secs(client_options.http.timeout_secs));
    debug!(provider = spec.id, model = %settings.model, retries, "Wrapping provider with retry");
    Ok(Arc::new(RetryProvider::new(provider, retries, attempt_timeout)))
}

/// Build a ready-to-invoke chat model for `provider_id`.
///
/// Unknown ids and missing required credential fields are configuration
/// errors. No request is sent until the model is invoked.
pub fn build_chat_model(
    provider_id: &str,
    credentials: &CredentialBag,
    model: &str,
    options: &ModelOptions,
    client: &ClientOptions,
) -> Result<ChatModel, ProviderError> {
    let spec = find_provider(provider_id)
        .ok_or_else(|| ProviderError::UnknownProvider(provider_id.to_string()))?;

    let settings = resolve_settings(spec, model, options);
    if settings.model.is_empty() {
        return Err(ProviderError::NotConfigured(format!(
            "Provider '{provider_id}' needs a model name"
        )));
    }

    let provider = build_provider(spec, credentials, &settings, options, client)?;

    debug!(
        provider = provider_id,
        model = %settings.model,
        proxied = client.base_url.is_some(),
        "Built chat model"
    );

    Ok(ChatModel::new(provider, settings))
}

/// Embeddings over an OpenAI-protocol endpoint.
pub fn build_openai_embeddings(
    api_key: &str,
    model: &str,
    client: &ClientOptions,
) -> Result<ProviderEmbeddings, ProviderError> {
    let url = client
        .base_url
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    let http = shared_clients().client_for(&url, &client.proxy, &client.http)?;
    let mut provider = OpenAiCompatProvider::new("openai", url, http).with_api_key(api_key);
    for (name, value) in &client.headers {
        provider = provider.with_header(name, value);
    }
    Ok(ProviderEmbeddings::new(Arc::new(provider), model))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(credential_type: &str, fields: Value) -> CredentialBag {
        let Value::Object(map) = fields else { panic!("object expected") };
        CredentialBag::new(credential_type, map)
    }

    fn full_bag() -> CredentialBag {
        bag(
            "any",
            json!({
                "apiKey": "k",
                "resourceName": "acme",
                "accessKeyId": "AKID",
                "secretAccessKey": "secret",
                "baseUrl": "http://localhost:1234/v1"
            }),
        )
    }

    #[test]
    fn every_provider_builds_without_network() {
        for spec in PROVIDERS {
            let model = build_chat_model(
                spec.id,
                &full_bag(),
                "some-model",
                &ModelOptions::default(),
                &ClientOptions::default(),
            )
            .unwrap_or_else(|e| panic!("{} failed: {e}", spec.id));
            assert_eq!(model.settings().model, "some-model");
            assert_eq!(model.provider_name(), spec.id_as_reported());
        }
    }

    impl ProviderSpec {
        fn id_as_reported(&self) -> &'static str {
            match self.protocol {
                Protocol::Anthropic => "anthropic",
                Protocol::Gemini => "gemini",
                Protocol::Ollama => "ollama",
                Protocol::Bedrock => "bedrock",
                _ => self.id,
            }
        }
    }

    #[test]
    fn unknown_provider_is_named_in_the_error() {
        let err = build_chat_model(
            "watsonx",
            &full_bag(),
            "m",
            &ModelOptions::default(),
            &ClientOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref id) if id == "watsonx"));
        assert!(err.to_string().contains("watsonx"));
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = build_chat_model(
            "openai",
            &bag("openAiApi", json!({})),
            "gpt-4o",
            &ModelOptions::default(),
            &ClientOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("apiKey"));
    }

    #[test]
    fn table_defaults_fill_missing_options() {
        let defaults = ModelOptions::default();
        let cohere = resolve_settings(find_provider("cohere").unwrap(), "", &defaults);
        assert_eq!(cohere.model, "command-r-plus");
        assert_eq!(cohere.temperature, Some(0.3));

        let gemini = resolve_settings(find_provider("gemini").unwrap(), "", &defaults);
        assert_eq!(gemini.max_tokens, Some(2048));
        assert_eq!(gemini.top_k, Some(40));
    }

    #[test]
    fn minus_one_means_provider_default() {
        let options: ModelOptions =
            serde_json::from_value(json!({"maxTokens": -1, "topK": -1})).unwrap();
        let s = resolve_settings(find_provider("anthropic").unwrap(), "", &options);
        assert_eq!(s.max_tokens, None);
        assert_eq!(s.top_k, None);
    }

    #[test]
    fn anthropic_thinking_clears_sampling() {
        let options: ModelOptions =
            serde_json::from_value(json!({"thinking": true, "temperature": 0.2, "topP": 0.5}))
                .unwrap();
        let s = resolve_settings(find_provider("anthropic").unwrap(), "", &options);
        assert_eq!(s.temperature, None);
        assert_eq!(s.top_p, None);
    }

    #[test]
    fn openai_options_become_body_fields() {
        let options: ModelOptions = serde_json::from_value(json!({
            "responseFormat": "json_object",
            "frequencyPenalty": 0.5,
            "reasoningEffort": "low"
        }))
        .unwrap();
        let s = resolve_settings(find_provider("openai").unwrap(), "gpt-4o", &options);
        assert_eq!(s.extra["response_format"]["type"], "json_object");
        assert_eq!(s.extra["reasoning_effort"], "low");
        assert!(s.extra.contains_key("frequency_penalty"));
    }

    #[test]
    fn ollama_options_are_nested() {
        let options: ModelOptions = serde_json::from_value(json!({
            "numCtx": 4096, "repeatPenalty": 1.1, "keepAlive": "5m", "format": "default"
        }))
        .unwrap();
        let s = resolve_settings(find_provider("ollama").unwrap(), "", &options);
        assert_eq!(s.extra["options"]["num_ctx"], 4096);
        assert_eq!(s.extra["keep_alive"], "5m");
        assert!(!s.extra.contains_key("format"));
    }

    #[test]
    fn base_url_precedence() {
        let spec = find_provider("openai").unwrap();
        let creds = bag("openAiApi", json!({"apiKey": "k", "url": "https://creds.example/v1/"}));
        let opts: ModelOptions =
            serde_json::from_value(json!({"baseURL": "https://option.example/v1"})).unwrap();

        assert_eq!(
            base_url(spec, &creds, &ModelOptions::default(), &ClientOptions::default()),
            "https://creds.example/v1"
        );
        assert_eq!(
            base_url(spec, &creds, &opts, &ClientOptions::default()),
            "https://option.example/v1"
        );
        let gateway = ClientOptions::default().with_base_url("https://oai.helicone.ai/v1");
        assert_eq!(base_url(spec, &creds, &opts, &gateway), "https://oai.helicone.ai/v1");
    }

    #[test]
    fn azure_endpoint_resolution() {
        let by_resource = bag("azureOpenAiApi", json!({"apiKey": "k", "resourceName": "acme"}));
        assert_eq!(
            azure_base_url(&by_resource, &ClientOptions::default()).unwrap(),
            "https://acme.openai.azure.com/openai/deployments"
        );
        let by_endpoint = bag("azureOpenAiApi", json!({"endpoint": "https://eu.example.com/"}));
        assert_eq!(
            azure_base_url(&by_endpoint, &ClientOptions::default()).unwrap(),
            "https://eu.example.com/openai/deployments"
        );
        let empty = bag("azureOpenAiApi", json!({}));
        assert!(azure_base_url(&empty, &ClientOptions::default()).is_err());
    }

    #[test]
    fn vllm_falls_back_to_dummy_key() {
        let spec = find_provider("vllm").unwrap();
        let key = api_key(spec, &bag("vllmApi", json!({}))).unwrap();
        assert_eq!(key.as_deref(), Some("dummy-key"));
    }

    #[test]
    fn options_parse_from_null_and_ignore_unknown_keys() {
        assert!(ModelOptions::from_value(&Value::Null).unwrap().temperature.is_none());
        let o = ModelOptions::from_value(&json!({"temperature": 0.1, "somethingElse": 1})).unwrap();
        assert_eq!(o.temperature, Some(0.1));
    }

    #[test]
    fn stop_sequences_are_split_and_trimmed() {
        let spec = find_provider("groq").unwrap();
        let options = ModelOptions::from_value(&json!({"stop": "END, ###,,"})).unwrap();
        let settings = resolve_settings(spec, "", &options);
        assert_eq!(settings.stop, vec!["END".to_string(), "###".to_string()]);
    }
}
