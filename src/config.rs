// Proxy configuration
//
// Loaded once at startup from a JSON file and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 11434;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DB_PATH: &str = "./llm_proxy.db";
pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 5;
/// One year
pub const MAX_CLEANUP_INTERVAL_MINUTES: u64 = 525_600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub backend_openai: OpenAiBackendConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chat_text_injection: ChatTextInjectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Log every request line and its status/latency
    pub verbose: bool,
    /// Log message contents and full responses
    pub log_messages: bool,
    pub log_raw_requests: bool,
    pub log_raw_responses: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            enable_cors: false,
            verbose: false,
            log_messages: false,
            log_raw_requests: false,
            log_raw_responses: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Ollama => "ollama",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: BackendKind,
    pub endpoint: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Tool names removed from chat requests before they reach the backend
    #[serde(default)]
    pub tool_blacklist: Vec<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenAiBackendConfig {
    /// Send `cache_prompt: true` with every request
    pub force_prompt_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: String,
    /// Newest records kept by the cleanup task (0 = unlimited)
    pub max_requests: u32,
    /// Minutes between cleanup runs (0 = disabled)
    pub cleanup_interval: u64,
    /// Records older than this are pruned (0 = no age limit)
    pub max_age_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            max_requests: DEFAULT_MAX_REQUESTS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL_MINUTES,
            max_age_days: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatTextInjectionConfig {
    pub enabled: bool,
    pub text: String,
    /// Which user message receives the text
    pub mode: InjectionMode,
}

impl ChatTextInjectionConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.text.is_empty()
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;
        config.normalize()?;
        Ok(config)
    }

    fn normalize(&mut self) -> Result<(), ConfigError> {
        let endpoint = self.backend.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("backend.endpoint must not be empty".to_string()));
        }
        self.backend.endpoint = endpoint.to_string();

        if self.server.host.is_empty() {
            self.server.host = DEFAULT_HOST.to_string();
        }
        if self.server.port == 0 {
            self.server.port = DEFAULT_PORT;
        }
        if self.backend.timeout == 0 {
            self.backend.timeout = DEFAULT_TIMEOUT_SECS;
        }
        if self.database.path.is_empty() {
            self.database.path = DEFAULT_DB_PATH.to_string();
        }
        if self.database.cleanup_interval > MAX_CLEANUP_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "database.cleanup_interval must be at most {} minutes",
                MAX_CLEANUP_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// URL clients use to reach `path` on this proxy
    pub fn frontend_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.server.host, self.server.port, path)
    }
}
