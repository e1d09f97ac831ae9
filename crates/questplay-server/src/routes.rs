//! REST surface: session creation, joining, listing, and event catch-up.

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use questplay_database::{SessionClientRecord, StoredEvent};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Build the application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/remoteplay/v1/new_session", post(new_session))
        .route("/remoteplay/v1/connect", post(connect))
        .route("/remoteplay/v1/sessions", get(list_sessions))
        .route("/remoteplay/v1/session/{id}/events", get(session_events))
        .route("/ws/remoteplay/v1/session/{id}", get(ws::ws_session))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": err.to_string() })),
        ),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NewSessionResponse {
    secret: String,
}

/// Create a fresh session and hand back its join secret. The creator
/// connects with the secret like any other participant.
async fn new_session(
    State(state): State<AppState>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let session = state.coordinator.create_session().await?;
    info!(session_id = session.id, "Session created");
    Ok(Json(NewSessionResponse {
        secret: session.secret,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectRequest {
    secret: String,
    client: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectResponse {
    session: i64,
}

/// Resolve a join secret to a session id and record the client as a
/// participant. Unknown or locked secrets are indistinguishable.
async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let session = state
        .coordinator
        .join_session(&req.secret, &req.client)
        .await?;
    info!(session_id = session.id, client = %req.client, "Client joined session");
    Ok(Json(ConnectResponse {
        session: session.id,
    }))
}

#[derive(Debug, Deserialize)]
struct ClientQuery {
    client: String,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<Vec<SessionClientRecord>>, ApiError> {
    let sessions = state.coordinator.sessions_for_client(&query.client).await?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default)]
    start: i64,
}

/// Catch-up fetch: all events with id greater than `start`, ascending.
async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    // 404 for sessions that never existed rather than an empty log.
    state.coordinator.get_session(id).await?;
    let events = state.coordinator.events_after(id, query.start).await?;
    Ok(Json(events))
}
