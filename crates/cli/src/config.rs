//! Configuration loading from toolchat.toml.

use runtime::{OpenAiBackend, OrchestratorConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "toolchat.toml";

const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub session: SessionConfig,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider name (currently only "openai" supported).
    pub provider: String,

    pub model: String,

    /// Any OpenAI-compatible endpoint; the public API when unset.
    pub base_url: Option<String>,

    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,

    pub max_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: None,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub max_rounds: usize,
    pub model_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub concurrent_tools: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: "Answer all questions by users in a brief and concise way.".to_string(),
            max_rounds: OrchestratorConfig::default().max_rounds,
            model_timeout_secs: None,
            tool_timeout_secs: None,
            concurrent_tools: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load from an explicit path, else `toolchat.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The API key from the file, or from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    fn api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        self.backend
            .api_key
            .clone()
            .or_else(|| env(API_KEY_ENV))
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingAuth)
    }

    /// Build the model backend described by `[backend]`.
    pub fn backend(&self) -> Result<OpenAiBackend, ConfigError> {
        if self.backend.provider != "openai" {
            return Err(ConfigError::UnsupportedProvider(
                self.backend.provider.clone(),
            ));
        }

        let mut builder = OpenAiBackend::builder(self.api_key()?, &self.backend.model);
        if let Some(base_url) = &self.backend.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(max_tokens) = self.backend.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        Ok(builder.build())
    }

    /// Orchestrator settings described by `[session]`.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        let session = &self.session;
        let mut config = OrchestratorConfig::default()
            .max_rounds(session.max_rounds)
            .concurrent_tools(session.concurrent_tools);
        if let Some(secs) = session.model_timeout_secs {
            config = config.model_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = session.tool_timeout_secs {
            config = config.tool_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("authentication not configured: set backend.api_key or OPENAI_API_KEY")]
    MissingAuth,

    #[error("unsupported provider '{0}'")]
    UnsupportedProvider(String),
}
