//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/samsara/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/samsara/` (~/.config/samsara/)
//! - State/Logs: `$XDG_STATE_HOME/samsara/` (~/.local/state/samsara/)

use crate::compression::CompressorRegistry;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path of the ingestion endpoint, relative to the configured URL
pub const API_PATH: &str = "/v1/events";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Publishing client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Publishing client configuration
///
/// Immutable once handed to a [`Client`](crate::Client); the client keeps
/// the normalized copy returned by [`ClientConfig::validate`].
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Ingestion API base URL (e.g., `http://samsara-ingestion.local/`)
    pub url: Option<String>,

    /// Default `sourceId` for recorded events that carry none
    pub source_id: Option<String>,

    /// Start the periodic publishing task on construction
    #[serde(default = "default_start_publishing_thread")]
    pub start_publishing_thread: bool,

    /// Milliseconds between publish attempts
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Buffer capacity; the oldest events are dropped beyond it
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// Events required in the buffer before a scheduled publish
    #[serde(default = "default_min_buffer_size")]
    pub min_buffer_size: usize,

    /// Network timeout for send operations, in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Payload compression mode ("gzip" or "none")
    #[serde(default = "default_compression")]
    pub compression: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            source_id: None,
            start_publishing_thread: default_start_publishing_thread(),
            publish_interval_ms: default_publish_interval_ms(),
            max_buffer_size: default_max_buffer_size(),
            min_buffer_size: default_min_buffer_size(),
            send_timeout_ms: default_send_timeout_ms(),
            compression: default_compression(),
        }
    }
}

fn default_start_publishing_thread() -> bool {
    true
}

fn default_publish_interval_ms() -> u64 {
    30_000
}

fn default_max_buffer_size() -> usize {
    10_000
}

fn default_min_buffer_size() -> usize {
    100
}

fn default_send_timeout_ms() -> u64 {
    30_000
}

fn default_compression() -> String {
    "gzip".to_string()
}

impl ClientConfig {
    /// Configuration with default values pointing at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Validate configuration, returning the normalized copy
    ///
    /// An out-of-range `min_buffer_size` is clamped to 1 rather than rejected.
    pub fn validate(&self, compressors: &CompressorRegistry) -> Result<ClientConfig> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {}
            _ => {
                return Err(Error::InvalidConfiguration(
                    "url of the ingestion API is required".to_string(),
                ))
            }
        }
        if self.publish_interval_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "publish_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "max_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "send_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if !compressors.contains(&self.compression) {
            return Err(Error::InvalidConfiguration(format!(
                "compression must be one of {:?}, not {:?}",
                compressors.names(),
                self.compression
            )));
        }

        let mut config = self.clone();
        if config.min_buffer_size == 0 || config.min_buffer_size > config.max_buffer_size {
            tracing::debug!(
                min_buffer_size = config.min_buffer_size,
                max_buffer_size = config.max_buffer_size,
                "min_buffer_size out of range, using 1"
            );
            config.min_buffer_size = 1;
        }
        Ok(config)
    }

    /// Full URL of the events endpoint
    pub fn endpoint(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|url| format!("{}{}", url.trim_end_matches('/'), API_PATH))
    }

    /// Interval between scheduled publish attempts
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    /// Network timeout for a single publish
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to read config file {:?}: {}", path, e))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfiguration(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/samsara/config.toml` (~/.config/samsara/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("samsara").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/samsara/` (~/.local/state/samsara/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("samsara")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("samsara.log")
    }
}
