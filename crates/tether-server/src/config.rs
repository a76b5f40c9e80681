//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Push notification settings.
    #[serde(default)]
    pub push: PushConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "tether_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Push notification configuration. Without a token the push channel is
/// disabled and alert fan-out only logs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushConfig {
    /// Courier API auth token.
    #[serde(default)]
    pub courier_token: Option<String>,

    /// Override for the Courier send endpoint (primarily for testing).
    #[serde(default)]
    pub courier_send_url: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "tether.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override held an unparseable value.
    #[error("invalid value in env var {var}: {value}")]
    InvalidEnvValue { var: &'static str, value: String },
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist.
///
/// Environment variable overrides:
/// - `TETHER_HOST` overrides `server.host`
/// - `TETHER_PORT` overrides `server.port`
/// - `TETHER_DB_PATH` overrides `database.path`
/// - `TETHER_LOG_LEVEL` overrides `logging.level`
/// - `TETHER_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `TETHER_COURIER_TOKEN` overrides `push.courier_token`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if an override value cannot be parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) if std::path::Path::new(path).exists() => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        }
        _ => Config::default(),
    };

    if let Ok(host) = std::env::var("TETHER_HOST") {
        config.server.host = host.parse().map_err(|_| ConfigError::InvalidEnvValue {
            var: "TETHER_HOST",
            value: host,
        })?;
    }
    if let Ok(port) = std::env::var("TETHER_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvValue {
            var: "TETHER_PORT",
            value: port,
        })?;
    }
    if let Ok(db_path) = std::env::var("TETHER_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("TETHER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("TETHER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(token) = std::env::var("TETHER_COURIER_TOKEN") {
        if !token.trim().is_empty() {
            config.push.courier_token = Some(token);
        }
    }

    Ok(config)
}
