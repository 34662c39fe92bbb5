//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::event::Fields;
use crate::hub::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form table handed to every handler
    #[serde(default)]
    pub vars: Fields,
}

/// HTTP / WebSocket listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which global lock implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// In-process lock, single hub process
    #[default]
    Memory,
    /// Row lock in a SQLite file shared by several hub processes
    Sqlite,
}

impl FromStr for LockBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(LockBackend::Memory),
            "sqlite" => Ok(LockBackend::Sqlite),
            other => Err(ConfigError::Invalid(format!("unknown lock backend '{other}'"))),
        }
    }
}

impl fmt::Display for LockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockBackend::Memory => write!(f, "memory"),
            LockBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Global lock and GlobalVars storage
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub backend: LockBackend,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub table_prefix: String,

    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("switchyard").join("hub.db"))
        .unwrap_or_else(|| PathBuf::from("./switchyard_data/hub.db"))
}

fn default_stale_after() -> u64 {
    60
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            database_path: default_database_path(),
            table_prefix: String::new(),
            stale_after_secs: default_stale_after(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("switchyard").join("config.toml")),
            Some(PathBuf::from("/etc/switchyard/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("SWITCHYARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SWITCHYARD_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SWITCHYARD_PORT={port}")))?;
        }
        if let Some(ms) = lookup("SWITCHYARD_TICK_MS") {
            self.hub.tick_interval_ms = ms
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SWITCHYARD_TICK_MS={ms}")))?;
        }
        if let Some(backend) = lookup("SWITCHYARD_LOCK_BACKEND") {
            self.lock.backend = backend.parse()?;
        }
        if let Some(path) = lookup("SWITCHYARD_DATABASE") {
            self.lock.database_path = PathBuf::from(path);
        }
        if let Some(level) = lookup("SWITCHYARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SWITCHYARD_LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Switchyard Configuration
#
# Environment variables override these settings:
# - SWITCHYARD_HOST
# - SWITCHYARD_PORT
# - SWITCHYARD_TICK_MS
# - SWITCHYARD_LOCK_BACKEND
# - SWITCHYARD_DATABASE
# - SWITCHYARD_LOG_LEVEL
# - SWITCHYARD_LOG_FORMAT

[server]
# Listener host
host = "0.0.0.0"

# Listener port (WebSocket on /ws, HTTP trigger on /api/v1/trigger)
port = 8000

[hub]
# Housekeeping and poll-delivery interval (ms)
tick_interval_ms = 1000

# Maximum number of concurrent sockets
max_connections = 1000

[lock]
# Global lock backend: memory (single process) or sqlite (shared file)
backend = "memory"

# SQLite file for the sqlite backend (default: <data dir>/switchyard/hub.db)
# database_path = "/var/lib/switchyard/hub.db"

# Prefix for the sockets_sessions table
table_prefix = ""

# A lock row older than this is considered abandoned (seconds)
stale_after_secs = 60

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

[vars]
# Free-form values handed to every handler
"#
    .to_string()
}
