//! HTTP error mapping for session operations.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use questplay_sessions::SessionError;
use serde_json::json;
use tracing::error;

/// Wrapper turning [`SessionError`] into an HTTP response.
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            SessionError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            SessionError::UnknownSession(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            SessionError::SequenceMismatch { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            SessionError::ConcurrencyConflict => (StatusCode::CONFLICT, self.0.to_string()),
            SessionError::Database(err) => {
                error!(error = %err, "Database error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
