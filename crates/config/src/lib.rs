//! Configuration loading, validation, and management for FlowLM.
//!
//! Loads configuration from `~/.flowlm/config.toml` (or the file named by
//! `FLOWLM_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use flowlm_core::CredentialBag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.flowlm/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Outbound HTTP settings shared by every provider client
    #[serde(default)]
    pub http: HttpConfig,

    /// Defaults applied to agent nodes when a parameter is absent
    #[serde(default)]
    pub agent: AgentDefaults,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Stored credentials, keyed by credential type name (`openAiApi`, `langfuseApi`, ...)
    #[serde(default)]
    pub credentials: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("http", &self.http)
            .field("agent", &self.agent)
            .field("logging", &self.logging)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout used when a proxy is in effect
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// System message used in "auto" prompt mode when the item carries none
    #[serde(default = "default_system_message")]
    pub system_message: String,
}

fn default_max_iterations() -> usize {
    10
}
fn default_system_message() -> String {
    "You are a helpful assistant.".into()
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_message: default_system_message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::ValidationError(format!(
                "unknown log format '{other}' (expected 'pretty' or 'json')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `FLOWLM_CONFIG` or the default path, then apply
    /// environment overrides:
    /// - `FLOWLM_LOG_FORMAT` (`pretty` | `json`)
    /// - `FLOWLM_HTTP_TIMEOUT_SECS`
    /// - `FLOWLM_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_path(&Self::config_path())
    }

    /// Like [`load`](Self::load), reading `path` instead of the default location.
    pub fn load_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// `FLOWLM_CONFIG`, or `config.toml` in the config directory.
    pub fn config_path() -> PathBuf {
        std::env::var("FLOWLM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(format) = var("FLOWLM_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        if let Some(timeout) = var("FLOWLM_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = timeout.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FLOWLM_HTTP_TIMEOUT_SECS must be an integer, got '{timeout}'"
                ))
            })?;
        }

        if let Some(max) = var("FLOWLM_MAX_ITERATIONS") {
            self.agent.max_iterations = max.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FLOWLM_MAX_ITERATIONS must be an integer, got '{max}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".flowlm")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// The stored credential of the given type, if configured.
    pub fn credential(&self, credential_type: &str) -> Option<CredentialBag> {
        self.credentials
            .get(credential_type)
            .map(|fields| CredentialBag::new(credential_type, fields.clone()))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.http.timeout_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
        assert_eq!(parsed.http.connect_timeout_secs, 30);
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = AppConfig {
            agent: AgentDefaults {
                max_iterations: 0,
                ..AgentDefaults::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = AppConfig {
            http: HttpConfig {
                timeout_secs: 0,
                connect_timeout_secs: 30,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.system_message, "You are a helpful assistant.");
    }

    #[test]
    fn credentials_section_parses_into_bags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
format = "json"

[credentials.openAiApi]
apiKey = "sk-test"
url = "https://api.openai.com/v1"

[credentials.langfuseApi]
baseUrl = "https://cloud.langfuse.com"
publicKey = "pk-lf"
secretKey = "sk-lf"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);

        let bag = config.credential("openAiApi").unwrap();
        assert_eq!(bag.string("apiKey"), Some("sk-test"));
        assert!(config.credential("anthropicApi").is_none());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-lf"));
        assert!(debug.contains("langfuseApi"));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FLOWLM_LOG_FORMAT", "json"),
            ("FLOWLM_HTTP_TIMEOUT_SECS", "15"),
            ("FLOWLM_MAX_ITERATIONS", "3"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.http.timeout_secs, 15);
        assert_eq!(config.agent.max_iterations, 3);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "FLOWLM_MAX_ITERATIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FLOWLM_MAX_ITERATIONS"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_iterations"));
        assert!(toml_str.contains("timeout_secs"));
    }
}
