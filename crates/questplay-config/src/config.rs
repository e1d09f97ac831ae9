//! Configuration management for the server.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8081;

/// Default SQLite database path.
pub const DEFAULT_DATABASE_PATH: &str = "questplay.db";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main server configuration.
///
/// Loaded from an optional JSON file, then overridden by environment
/// variables (`QUESTPLAY_PORT`, `QUESTPLAY_DATABASE_PATH`,
/// `QUESTPLAY_LOG_LEVEL`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port for the HTTP/WebSocket server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Allowed CORS origins for the REST surface. Empty allows any origin,
    /// which is what local dev and the mobile apps need.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file if it exists, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(port) = std::env::var("QUESTPLAY_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(path) = std::env::var("QUESTPLAY_DATABASE_PATH") {
            self.database_path = path;
        }
        if let Ok(log_level) = std::env::var("QUESTPLAY_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }
}
