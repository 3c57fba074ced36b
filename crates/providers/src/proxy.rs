//! Outbound HTTP proxy resolution and the per-URL client cache.
//!
//! The proxy for a target URL is a pure function of the URL and the proxy
//! environment (`HTTPS_PROXY`, `HTTP_PROXY`, `ALL_PROXY`, `NO_PROXY`, in
//! either case). Clients are built once per base URL and reused for the life
//! of the process; the cache never evicts.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use flowlm_config::HttpConfig;
use flowlm_core::error::ProviderError;
use tracing::debug;

/// Proxy environment captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    https: Option<String>,
    http: Option<String>,
    all: Option<String>,
    no_proxy: Vec<String>,
}

impl ProxySettings {
    /// Read the standard proxy variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read proxy variables through `lookup`; upper case wins over lower case.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .or_else(|| lookup(&name.to_ascii_lowercase()))
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            https: get("HTTPS_PROXY"),
            http: get("HTTP_PROXY"),
            all: get("ALL_PROXY"),
            no_proxy: get("NO_PROXY")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_ascii_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// The proxy URL to use for `target`, if any.
    pub fn proxy_for_url(&self, target: &str) -> Option<String> {
        let url = reqwest::Url::parse(target).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        if self.bypasses(&host, url.port_or_known_default()) {
            return None;
        }

        let scheme_proxy = match url.scheme() {
            "https" => self.https.as_ref(),
            "http" => self.http.as_ref(),
            _ => None,
        };
        scheme_proxy.or(self.all.as_ref()).cloned()
    }

    fn bypasses(&self, host: &str, port: Option<u16>) -> bool {
        self.no_proxy.iter().any(|entry| {
            if entry == "*" {
                return true;
            }
            let (pattern, entry_port) = match entry.rsplit_once(':') {
                Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, p.parse().ok()),
                _ => (entry.as_str(), None),
            };
            if entry_port.is_some() && entry_port != port {
                return false;
            }
            let pattern = pattern.trim_start_matches("*.").trim_start_matches('.');
            host == pattern || host.ends_with(&format!(".{pattern}"))
        })
    }
}

/// Memoised HTTP clients keyed by base URL.
#[derive(Default)]
pub struct ClientCache {
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client for `base_url`, building it on first use.
    pub fn client_for(
        &self,
        base_url: &str,
        proxy: &ProxySettings,
        http: &HttpConfig,
    ) -> Result<reqwest::Client, ProviderError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| ProviderError::NotConfigured("HTTP client cache poisoned".into()))?;

        if let Some(client) = clients.get(base_url) {
            return Ok(client.clone());
        }

        let client = build_client(base_url, proxy, http)?;
        clients.insert(base_url.to_string(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_client(
    base_url: &str,
    proxy: &ProxySettings,
    http: &HttpConfig,
) -> Result<reqwest::Client, ProviderError> {
    let builder = reqwest::Client::builder().timeout(Duration::from_secs(http.timeout_secs));

    let builder = match proxy.proxy_for_url(base_url) {
        Some(proxy_url) => {
            debug!(base_url, proxy = %proxy_url, "Routing provider through proxy");
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| {
                ProviderError::NotConfigured(format!("Invalid proxy URL '{proxy_url}': {e}"))
            })?;
            builder
                .proxy(proxy)
                .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// The process-wide client cache.
pub fn shared_clients() -> &'static ClientCache {
    static CACHE: OnceLock<ClientCache> = OnceLock::new();
    CACHE.get_or_init(ClientCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> ProxySettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxySettings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn no_environment_means_no_proxy() {
        assert_eq!(settings(&[]).proxy_for_url("https://api.openai.com/v1"), None);
    }

    #[test]
    fn scheme_specific_proxy_is_chosen() {
        let s = settings(&[
            ("HTTPS_PROXY", "http://secure-proxy:3128"),
            ("http_proxy", "http://plain-proxy:3128"),
        ]);
        assert_eq!(
            s.proxy_for_url("https://api.anthropic.com").as_deref(),
            Some("http://secure-proxy:3128")
        );
        assert_eq!(
            s.proxy_for_url("http://localhost:11434").as_deref(),
            Some("http://plain-proxy:3128")
        );
    }

    #[test]
    fn all_proxy_is_the_fallback() {
        let s = settings(&[("ALL_PROXY", "socks5://gw:1080")]);
        assert_eq!(
            s.proxy_for_url("https://api.groq.com/openai/v1").as_deref(),
            Some("socks5://gw:1080")
        );
    }

    #[test]
    fn no_proxy_matches_suffixes_and_ports() {
        let s = settings(&[
            ("HTTPS_PROXY", "http://proxy:3128"),
            ("HTTP_PROXY", "http://proxy:3128"),
            ("NO_PROXY", "localhost:11434, .internal.example.com"),
        ]);
        assert_eq!(s.proxy_for_url("http://localhost:11434/api/chat"), None);
        assert!(s.proxy_for_url("http://localhost:8000/v1").is_some());
        assert_eq!(s.proxy_for_url("https://llm.internal.example.com/v1"), None);
        assert!(s.proxy_for_url("https://api.mistral.ai/v1").is_some());
    }

    #[test]
    fn clients_are_memoised_per_url() {
        let cache = ClientCache::new();
        let http = HttpConfig::default();
        let proxy = ProxySettings::default();
        cache.client_for("https://api.openai.com/v1", &proxy, &http).unwrap();
        cache.client_for("https://api.openai.com/v1", &proxy, &http).unwrap();
        cache.client_for("https://api.x.ai/v1", &proxy, &http).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
