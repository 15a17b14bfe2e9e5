//! Relay configuration loaded from TOML.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::persona::PersonaParams;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where per-user documents live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = dirs::data_dir().map_or_else(
            || PathBuf::from("sessions"),
            |d| d.join("assistant-relay").join("sessions"),
        );
        Self { dir }
    }
}

/// Exchange behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    pub poll_interval_ms: u64,
    /// Upper bound on status polls; unbounded when absent.
    pub max_polls: Option<u32>,
    /// Whole-exchange timeout; none when absent.
    pub timeout_secs: Option<u64>,
    /// Use the streaming path instead of polling.
    pub streaming: bool,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 400,
            max_polls: None,
            timeout_secs: None,
            streaming: true,
        }
    }
}

impl DialogConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Live-edit behaviour while streaming.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub snapshot_interval_ms: u64,
    /// Largest message the channel accepts, in characters.
    pub chunk_limit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 1000,
            chunk_limit: 4096,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub const fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

/// Completion backend endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Channel access and binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Users allowed to talk to the relay; everyone when empty.
    pub allowed_users: Vec<i64>,
    /// Access token of each WebSocket client and the user it speaks for.
    /// Connections without a listed token are refused.
    pub tokens: HashMap<String, i64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            allowed_users: Vec::new(),
            tokens: HashMap::new(),
        }
    }
}

/// Daily-schedule prompt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Instructions placed before the task lists; a built-in text when absent.
    pub preamble: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub storage: StorageConfig,
    pub dialog: DialogConfig,
    pub stream: StreamConfig,
    pub persona: PersonaParams,
    pub backend: BackendConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
}

impl RelayConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
