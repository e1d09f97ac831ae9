//! Session coordination error types.

use questplay_database::DatabaseError;
use thiserror::Error;

/// Session coordination error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Join-by-secret miss (unknown or locked session)
    #[error("Session not found")]
    NotFound,

    /// Commit referenced a nonexistent session id
    #[error("Unknown session: {0}")]
    UnknownSession(i64),

    /// Client-asserted sequence number does not follow the counter
    #[error("Event counter mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: i64, got: i64 },

    /// Another writer advanced the counter first; caller must refetch and retry
    #[error("Concurrent write conflict on event counter")]
    ConcurrencyConflict,

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
