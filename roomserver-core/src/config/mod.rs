//! Configuration for the room server
//!
//! Loaded from a TOML file or from `ROOMSERVER_*` environment variables on
//! top of defaults. Every loader validates before returning.

use crate::core_room::storage::memory_store::DEFAULT_BROADCAST_CAPACITY;
use crate::core_room::types::ServerName;
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

/// Identity of this server and per-request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Domain this server is authoritative for, e.g. `example.org`
    pub server_name: String,

    /// Upper bound for a single peek call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Room store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

/// Output stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Events buffered per subscriber of the in-memory output stream
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/roomserver.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn server_name(&self) -> ServerName {
        ServerName::new(self.server_name.clone())
    }
}

fn parse_env<T>(key: &str, what: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: ROOMSERVER_<SECTION>_<KEY>
    /// Example: ROOMSERVER_SERVER_NAME=example.org
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(name) = env::var("ROOMSERVER_SERVER_NAME") {
            self.server.server_name = name;
        }
        if let Ok(raw) = env::var("ROOMSERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid request timeout: {}", e)))?;
        }
        if let Ok(path) = env::var("ROOMSERVER_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Ok(level) = env::var("ROOMSERVER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("ROOMSERVER_LOG_JSON", "JSON flag")? {
            self.logging.json_format = json;
        }
        if let Some(capacity) = parse_env("ROOMSERVER_OUTPUT_BROADCAST_CAPACITY", "broadcast capacity")? {
            self.output.broadcast_capacity = capacity;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.server.server_name;
        if name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "server_name must not be empty".to_string(),
            ));
        }
        if name.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ConfigError::ValidationFailed(format!(
                "server_name {:?} is not a valid domain",
                name
            )));
        }

        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.output.broadcast_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "broadcast_capacity must be greater than 0".to_string(),
            ));
        }

        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
