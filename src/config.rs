//! Configuration sources.
//!
//! Every setting is looked up at the moment it is needed rather than captured
//! at startup, so a reloaded `.env` or an updated [`MapSource`] takes effect on
//! the next call without restarting the process.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use thiserror::Error;

/// Full URL of the API Hub `:searchResources` endpoint.
pub const APIHUB_SEARCH_URL: &str = "APIHUB_SEARCH_URL";
/// Pre-obtained bearer token, used when the credential chain fails.
pub const APIHUB_ACCESS_TOKEN: &str = "APIHUB_ACCESS_TOKEN";
/// Inline service-account key JSON.
pub const APIHUB_SA_KEY_JSON: &str = "APIHUB_SA_KEY_JSON";
/// Static API key attached to operations that declare an auth requirement.
pub const APIKEY_CREDENTIAL: &str = "APIKEY_CREDENTIAL";
/// API Hub REST base used for spec lookups.
pub const APIHUB_API_BASE: &str = "APIHUB_API_BASE";
/// Path to an Application Default Credentials key file.
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Model used by the assistant and the LLM-backed delegate.
pub const TALK2API_MODEL: &str = "TALK2API_MODEL";
/// Delegate selection strategy: `llm` or `keyword`.
pub const TALK2API_EXECUTOR: &str = "TALK2API_EXECUTOR";
/// Upper bound on assistant tool rounds per user message.
pub const TALK2API_MAX_TOOL_ROUNDS: &str = "TALK2API_MAX_TOOL_ROUNDS";
/// HTTP port for the server binary.
pub const PORT: &str = "PORT";
/// Gemini API key; `GEMINI_API_KEY` is accepted as an alias.
pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// `true` routes model calls through Vertex AI with bearer auth.
pub const GOOGLE_GENAI_USE_VERTEXAI: &str = "GOOGLE_GENAI_USE_VERTEXAI";
pub const GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const GOOGLE_CLOUD_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";

pub const DEFAULT_APIHUB_API_BASE: &str = "https://apihub.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration errors surfaced while building long-lived components.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// A source of string configuration values.
///
/// Implementations must treat empty values as unset.
pub trait ConfigSource: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// Reads the process environment on every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory configuration that can be changed while the process runs.
#[derive(Debug, Default)]
pub struct MapSource {
    values: RwLock<HashMap<String, String>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MapSource::set`].
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

/// Which strategy the execution delegate uses to pick an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Llm,
    Keyword,
}

/// Settings needed once, when the server wires its components together.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub model: String,
    pub executor: ExecutorKind,
    pub max_tool_rounds: usize,
    pub port: u16,
}

impl ServerSettings {
    pub fn load(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let executor = match source.get_or(TALK2API_EXECUTOR, "llm").to_lowercase().as_str() {
            "llm" => ExecutorKind::Llm,
            "keyword" => ExecutorKind::Keyword,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: TALK2API_EXECUTOR.to_string(),
                    value: other.to_string(),
                })
            }
        };

        let max_tool_rounds = match source.get(TALK2API_MAX_TOOL_ROUNDS) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: TALK2API_MAX_TOOL_ROUNDS.to_string(),
                    value: raw,
                })?,
            None => DEFAULT_MAX_TOOL_ROUNDS,
        };

        let port = match source.get(PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: PORT.to_string(),
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            model: source.get_or(TALK2API_MODEL, DEFAULT_MODEL),
            executor,
            max_tool_rounds,
            port,
        })
    }
}
