//! Configuration loading for chat-server.
//!
//! Configuration is loaded from a TOML file (default: `pairchat.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the hub.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Message validation.
    #[serde(default)]
    pub messages: MessagesConfig,
    /// Event bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
    /// Typing signal configuration.
    #[serde(default)]
    pub typing: TypingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Connection pool size (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits on a locked database (default: 5s).
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl StorageConfig {
    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

/// Message validation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    /// Maximum content size in bytes (default: 16KB).
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Buffered events per conversation channel before slow subscribers lag (default: 256).
    #[serde(default = "default_bus_capacity")]
    pub channel_capacity: usize,
}

/// Typing signal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TypingConfig {
    /// Buffered typing signals per conversation (default: 64).
    #[serde(default = "default_typing_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("pairchat.db")
}

fn default_max_connections() -> u32 {
    10
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_max_content_bytes() -> usize {
    16 * 1024
}

fn default_bus_capacity() -> usize {
    256
}

fn default_typing_capacity() -> usize {
    64
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_bus_capacity(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_typing_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
