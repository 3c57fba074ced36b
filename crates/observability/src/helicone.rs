//! Helicone adapter — requests are routed through Helicone's proxies and
//! tagged with `Helicone-*` headers; nothing is exported by FlowLM itself.

use flowlm_core::CredentialBag;
use flowlm_core::error::ProviderError;
use serde_json::Value;

use crate::metadata::opt_string;

pub const OPENAI_PROXY_URL: &str = "https://oai.helicone.ai/v1";
pub const ANTHROPIC_PROXY_URL: &str = "https://anthropic.helicone.ai";
pub const AZURE_PROXY_URL: &str = "https://oai.helicone.ai/openai/deployments";
pub const GROQ_PROXY_URL: &str = "https://groq.helicone.ai/openai/v1";
pub const GATEWAY_URL: &str = "https://gateway.helicone.ai";

const MISTRAL_TARGET_URL: &str = "https://api.mistral.ai";

/// Providers the Helicone agent can route, with their credential types.
pub const HELICONE_PROVIDERS: [(&str, &str); 7] = [
    ("openai", "openAiHeliconeApi"),
    ("anthropic", "anthropicHeliconeApi"),
    ("azureOpenai", "azureOpenAiHeliconeApi"),
    ("gemini", "geminiHeliconeApi"),
    ("groq", "groqHeliconeApi"),
    ("mistral", "mistralHeliconeApi"),
    ("openaiCompatible", "openAiCompatibleHeliconeApi"),
];

/// The credential type holding provider and Helicone keys for `provider`.
/// `None` when Helicone cannot route `provider`.
pub fn credential_type(provider: &str) -> Option<&'static str> {
    HELICONE_PROVIDERS
        .iter()
        .find(|(id, _)| *id == provider)
        .map(|(_, cred)| *cred)
}

/// The `heliconeOptions` node parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeliconeOptions {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// `(name, value)` pairs sent as `Helicone-Property-<name>`
    pub properties: Vec<(String, String)>,
}

impl HeliconeOptions {
    pub fn from_value(options: &Value) -> Self {
        let properties = options
            .pointer("/customProperties/property")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|p| Some((opt_string(p, "name")?, opt_string(p, "value")?)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            session_id: opt_string(options, "sessionId"),
            user_id: opt_string(options, "userId"),
            properties,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }
}

/// Headers identifying the caller to Helicone.
pub fn helicone_headers(
    helicone_api_key: &str,
    options: &HeliconeOptions,
) -> Vec<(String, String)> {
    let mut headers = vec![("Helicone-Auth".to_string(), format!("Bearer {helicone_api_key}"))];
    if let Some(session_id) = &options.session_id {
        headers.push(("Helicone-Session-Id".into(), session_id.clone()));
    }
    if let Some(user_id) = &options.user_id {
        headers.push(("Helicone-User-Id".into(), user_id.clone()));
    }
    for (name, value) in &options.properties {
        headers.push((format!("Helicone-Property-{name}"), value.clone()));
    }
    headers
}

/// How to reach one provider through Helicone.
#[derive(Debug, Clone, PartialEq)]
pub struct HeliconeRoute {
    /// Entry of the provider table to build the client from
    pub provider_id: &'static str,
    /// Replacement base URL; `None` talks to the provider directly
    pub base_url: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Resolve the proxy URL and headers for `provider`.
///
/// Gemini has no Helicone proxy and is called directly, without headers.
/// Mistral and generic OpenAI-compatible endpoints go through the gateway
/// with `Helicone-Target-Url`. Azure keeps the Helicone URL as its base and
/// names the resource in `Helicone-OpenAI-API-Base`.
pub fn route(
    provider: &str,
    credentials: &CredentialBag,
    options: &HeliconeOptions,
) -> Result<HeliconeRoute, ProviderError> {
    let helicone_key = credentials
        .require("heliconeApiKey")
        .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
    let mut headers = helicone_headers(helicone_key, options);

    let (provider_id, base_url): (&'static str, Option<&str>) = match provider {
        "openai" => ("openai", Some(OPENAI_PROXY_URL)),
        "anthropic" => ("anthropic", Some(ANTHROPIC_PROXY_URL)),
        "azureOpenai" => {
            let resource = credentials
                .require("resourceName")
                .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
            headers.push((
                "Helicone-OpenAI-API-Base".into(),
                format!("https://{resource}.openai.azure.com"),
            ));
            ("azureOpenai", Some(AZURE_PROXY_URL))
        }
        "gemini" => {
            return Ok(HeliconeRoute {
                provider_id: "gemini",
                base_url: None,
                headers: Vec::new(),
            });
        }
        "groq" => ("groq", Some(GROQ_PROXY_URL)),
        "mistral" => {
            headers.push(("Helicone-Target-Url".into(), MISTRAL_TARGET_URL.into()));
            ("mistral", Some(GATEWAY_URL))
        }
        "openaiCompatible" => {
            let target = credentials
                .require("baseUrl")
                .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
            headers.push(("Helicone-Target-Url".into(), target.to_string()));
            ("openaiCompatible", Some(GATEWAY_URL))
        }
        other => return Err(ProviderError::UnknownProvider(other.to_string())),
    };

    Ok(HeliconeRoute {
        provider_id,
        base_url: base_url.map(str::to_string),
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(fields: Value) -> CredentialBag {
        let Value::Object(map) = fields else { panic!("object expected") };
        CredentialBag::new("openAiHeliconeApi", map)
    }

    fn header<'a>(route: &'a HeliconeRoute, name: &str) -> Option<&'a str> {
        route.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn options_skip_incomplete_properties() {
        let options = HeliconeOptions::from_value(&json!({
            "sessionId": "s-1",
            "customProperties": {"property": [
                {"name": "env", "value": "prod"},
                {"name": "empty", "value": ""},
                {"value": "orphan"}
            ]}
        }));
        assert_eq!(options.session_id.as_deref(), Some("s-1"));
        assert_eq!(options.properties, vec![("env".to_string(), "prod".to_string())]);
    }

    #[test]
    fn headers_carry_auth_session_user_and_properties() {
        let options = HeliconeOptions {
            session_id: Some("s".into()),
            user_id: Some("u".into()),
            properties: vec![("env".into(), "prod".into())],
        };
        let headers = helicone_headers("hk", &options);
        assert_eq!(headers[0], ("Helicone-Auth".to_string(), "Bearer hk".to_string()));
        assert!(headers.contains(&("Helicone-Session-Id".into(), "s".into())));
        assert!(headers.contains(&("Helicone-User-Id".into(), "u".into())));
        assert!(headers.contains(&("Helicone-Property-env".into(), "prod".into())));
    }

    #[test]
    fn openai_goes_through_the_oai_proxy() {
        let creds = bag(json!({"apiKey": "k", "heliconeApiKey": "hk"}));
        let r = route("openai", &creds, &HeliconeOptions::default()).unwrap();
        assert_eq!(r.base_url.as_deref(), Some(OPENAI_PROXY_URL));
        assert_eq!(header(&r, "Helicone-Auth"), Some("Bearer hk"));
    }

    #[test]
    fn azure_names_its_resource() {
        let r = route(
            "azureOpenai",
            &bag(json!({"apiKey": "k", "heliconeApiKey": "hk", "resourceName": "contoso"})),
            &HeliconeOptions::default(),
        )
        .unwrap();
        assert_eq!(r.base_url.as_deref(), Some(AZURE_PROXY_URL));
        assert_eq!(
            header(&r, "Helicone-OpenAI-API-Base"),
            Some("https://contoso.openai.azure.com")
        );
    }

    #[test]
    fn gateway_routes_set_target_url() {
        let creds = bag(json!({
            "apiKey": "k",
            "heliconeApiKey": "hk",
            "baseUrl": "https://llm.internal/v1"
        }));
        let mistral = route("mistral", &creds, &HeliconeOptions::default()).unwrap();
        assert_eq!(mistral.base_url.as_deref(), Some(GATEWAY_URL));
        assert_eq!(header(&mistral, "Helicone-Target-Url"), Some("https://api.mistral.ai"));

        let compat = route("openaiCompatible", &creds, &HeliconeOptions::default()).unwrap();
        assert_eq!(header(&compat, "Helicone-Target-Url"), Some("https://llm.internal/v1"));
    }

    #[test]
    fn gemini_is_called_directly() {
        let creds = bag(json!({"apiKey": "k", "heliconeApiKey": "hk"}));
        let r = route("gemini", &creds, &HeliconeOptions::default()).unwrap();
        assert_eq!(r.base_url, None);
        assert!(r.headers.is_empty());
    }

    #[test]
    fn unknown_provider_and_missing_key() {
        let creds = bag(json!({"apiKey": "k", "heliconeApiKey": "hk"}));
        assert!(matches!(
            route("cohere", &creds, &HeliconeOptions::default()),
            Err(ProviderError::UnknownProvider(id)) if id == "cohere"
        ));
        let without_key = bag(json!({"apiKey": "k"}));
        assert!(route("openai", &without_key, &HeliconeOptions::default()).is_err());
    }

    #[test]
    fn credential_types_per_provider() {
        assert_eq!(credential_type("groq"), Some("groqHeliconeApi"));
        assert_eq!(credential_type("bedrock"), None);
    }
}
