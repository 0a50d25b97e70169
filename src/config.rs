//! Service configuration, loaded from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable holding the `OpenAI` credential.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Provider selector (`openai` or `ollama`).
pub const PROVIDER_ENV: &str = "CHAT_RECALL_PROVIDER";
/// Model identifier override.
pub const MODEL_ENV: &str = "CHAT_RECALL_MODEL";
/// `OpenAI`-compatible base URL override.
pub const OPENAI_BASE_URL_ENV: &str = "CHAT_RECALL_OPENAI_BASE_URL";
/// Ollama base URL override.
pub const OLLAMA_URL_ENV: &str = "CHAT_RECALL_OLLAMA_URL";
/// `SQLite` database path.
pub const DB_PATH_ENV: &str = "CHAT_RECALL_DB";
/// HTTP port.
pub const PORT_ENV: &str = "CHAT_RECALL_PORT";

/// Default `OpenAI` model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "ministral-3:8b-instruct-2512-q8_0";
/// Default `OpenAI` API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which completion provider backs the gateway.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `OpenAI` chat completions API.
    #[default]
    OpenAi,
    /// Local or remote Ollama runtime.
    Ollama,
}

impl ProviderKind {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    /// Default model identifier for this provider.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::InvalidConfig(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

/// Top-level service configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion provider settings.
    pub ai: AiConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    /// Returns an error if a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let provider = get(PROVIDER_ENV)
            .map(|value| value.parse::<ProviderKind>())
            .transpose()?
            .unwrap_or_default();

        let ai = AiConfig {
            provider,
            api_key: get(OPENAI_API_KEY_ENV),
            model: get(MODEL_ENV).unwrap_or_else(|| provider.default_model().to_string()),
            openai_base_url: get(OPENAI_BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_base_url: get(OLLAMA_URL_ENV),
        };

        let storage = get(DB_PATH_ENV).map_or_else(StorageConfig::default, |path| StorageConfig {
            sqlite_path: PathBuf::from(path),
        });

        let port = match get(PORT_ENV) {
            Some(value) => value.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidConfig(format!("{PORT_ENV} must be a port number"))
            })?,
            None => DEFAULT_PORT,
        };

        let config = Self {
            ai,
            storage,
            server: ServerConfig { port },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "ai.model must not be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be > 0".to_string(),
            ));
        }

        Url::parse(&self.ai.openai_base_url)?;

        if let Some(base_url) = &self.ai.ollama_base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Completion provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// Selected provider.
    pub provider: ProviderKind,
    /// `OpenAI` API key. Absent means simulated mode for `openai`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// `OpenAI`-compatible base URL.
    pub openai_base_url: String,
    /// Optional Ollama base URL; the rig default is used when absent.
    pub ollama_base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            api_key: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            ollama_base_url: None,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("chat_recall.sqlite"),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> ConfigResult<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.ai.provider, ProviderKind::OpenAi);
        assert!(config.ai.api_key.is_none());
        assert_eq!(config.ai.model, "gpt-4");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("chat_recall.sqlite"));
    }

    #[test]
    fn test_empty_api_key_is_unset() {
        let config = load(&[(OPENAI_API_KEY_ENV, "  ")]).unwrap();
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn test_ollama_uses_its_default_model() {
        let config = load(&[(PROVIDER_ENV, "Ollama")]).unwrap();
        assert_eq!(config.ai.provider, ProviderKind::Ollama);
        assert_eq!(config.ai.model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (OPENAI_API_KEY_ENV, "sk-test"),
            (MODEL_ENV, "gpt-4o-mini"),
            (PORT_ENV, "9100"),
            (DB_PATH_ENV, "/tmp/chat.sqlite"),
        ])
        .unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/tmp/chat.sqlite"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[(PROVIDER_ENV, "anthropic")]).is_err());
        assert!(load(&[(PORT_ENV, "eighty")]).is_err());
        assert!(load(&[(PORT_ENV, "0")]).is_err());
        assert!(load(&[(OLLAMA_URL_ENV, "not a url")]).is_err());
    }
}
