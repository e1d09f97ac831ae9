//! Configuration and logging setup for the Questplay server.

mod config;
mod error;
pub mod logging;

pub use config::{Config, DEFAULT_DATABASE_PATH, DEFAULT_LOG_LEVEL, DEFAULT_PORT};
pub use error::{ConfigError, ConfigResult};
