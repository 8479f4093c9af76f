//! Configuration management for mongobridge.
//!
//! This module handles loading, parsing, and managing configuration:
//! - Configuration files (TOML format)
//! - Default values for every field
//!
//! Connection settings are hints forwarded opaquely to the transport; the
//! facade itself enforces none of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Address of the database server.
    #[serde(default = "default_address")]
    pub address: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Maximum pool size.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// Minimum pool size.
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,

    /// Connection idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs.
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_address() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_min_pool_size() -> u32 {
    2
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout: default_timeout(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config =
            toml::from_str(&raw).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongobridge")
            .join("config.toml")
    }

    /// Get connection timeout as Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }

    /// Get idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.idle_timeout)
    }
}

impl LogLevel {
    /// Convert to tracing::Level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Initialize the global tracing subscriber from the logging config.
///
/// Later calls are no-ops once a subscriber is installed.
pub fn init_logging(config: &LoggingConfig) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level.to_tracing_level())
        .with_target(false);

    if config.timestamps {
        let _ = subscriber.try_init();
    } else {
        let _ = subscriber.without_time().try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.address, "mongodb://localhost:27017");
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.logging.timestamps);
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join("mongobridge-config-test.toml");
        let mut config = Config::default();
        config.connection.address = "mongodb://db.internal:27018".to_string();
        config.logging.level = LogLevel::Debug;

        config.save(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.connection.address, "mongodb://db.internal:27018");
        assert_eq!(loaded.logging.level, LogLevel::Debug);
        assert_eq!(loaded.connection.max_pool_size, 10);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::from_file("/nonexistent/mongobridge.toml").unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let raw = "[connection]\naddress = \"mongodb://only:1\"\n";
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.connection.address, "mongodb://only:1");
        assert_eq!(config.connection.timeout, 30);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }
}
