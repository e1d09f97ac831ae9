//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Send error
    #[error("Failed to send message: {0}")]
    Send(String),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
