//! WebSocket event relay.
//!
//! Each connection authenticates with its session's join secret before
//! upgrade, then submits events as JSON frames. Commits are acknowledged
//! to the submitter with `INFLIGHT_COMMIT`/`INFLIGHT_REJECT`; committed
//! events fan out to every other peer in the session.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use questplay_relay::{EventFrame, ServerFrame};
use questplay_sessions::SessionError;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    client: String,
    secret: String,
}

/// `GET /ws/remoteplay/v1/session/{id}?client=&secret=`
///
/// The (client, secret) pair must match a prior join; anything else is
/// rejected before the upgrade completes.
pub async fn ws_session(
    State(state): State<AppState>,
    Path(session): Path<i64>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let authorized = match state
        .coordinator
        .verify_client(session, &query.client, &query.secret)
        .await
    {
        Ok(ok) => ok,
        Err(err) => {
            warn!(session_id = session, error = %err, "Connection check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !authorized {
        debug!(session_id = session, client = %query.client, "Rejected WebSocket upgrade");
        return StatusCode::FORBIDDEN.into_response();
    }

    upgrade.on_upgrade(move |socket| handle_socket(state, session, query.client, socket))
}

async fn handle_socket(state: AppState, session: i64, client: String, mut socket: WebSocket) {
    let mut handle = state
        .registry
        .register(session, Some(client.clone()))
        .await;

    info!(session_id = session, client = %client, "WebSocket connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_frame(
                            &state,
                            session,
                            handle.connection_id,
                            &client,
                            text.as_str(),
                        )
                        .await;
                        if send_frame(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/pong handled by axum; binary frames ignored.
                    }
                    Some(Err(err)) => {
                        debug!(session_id = session, error = %err, "WebSocket receive error");
                        break;
                    }
                }
            }
            broadcast = handle.rx.recv() => {
                match broadcast {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Registry dropped us, e.g. the outbound channel filled up.
                    None => break,
                }
            }
        }
    }

    state.registry.unregister(session, handle.connection_id).await;
    info!(session_id = session, client = %client, "WebSocket disconnected");
}

/// Commit one inbound frame and fan the committed event out to the
/// session's other peers. Returns the reply for the submitter.
async fn handle_frame(
    state: &AppState,
    session: i64,
    connection_id: u64,
    client: &str,
    text: &str,
) -> ServerFrame {
    let frame = match EventFrame::from_json(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(session_id = session, error = %err, "Malformed event frame");
            return ServerFrame::reject(None, "malformed frame");
        }
    };

    // Frames may omit the client; the authenticated connection fills it in.
    let frame_client = frame
        .client
        .clone()
        .unwrap_or_else(|| client.to_string());

    let result = match frame.id {
        Some(id) => {
            state
                .coordinator
                .commit_event(
                    session,
                    Some(frame_client),
                    frame.instance.clone(),
                    id,
                    frame.event_type.clone(),
                    frame.json.clone(),
                )
                .await
        }
        None => {
            state
                .coordinator
                .commit_event_without_id(
                    session,
                    Some(frame_client),
                    frame.instance.clone(),
                    frame.event_type.clone(),
                    frame.json.clone(),
                )
                .await
        }
    };

    match result {
        Ok(id) => {
            if let Ok(text) = frame.committed(id).to_json() {
                if let Err(err) = state
                    .registry
                    .broadcast(session, &text, Some(connection_id))
                    .await
                {
                    warn!(session_id = session, error = %err, "Broadcast failed");
                }
            }
            ServerFrame::commit(id)
        }
        Err(err) => {
            let detail = match &err {
                SessionError::SequenceMismatch { .. } | SessionError::ConcurrencyConflict => {
                    debug!(session_id = session, error = %err, "Commit rejected");
                    err.to_string()
                }
                other => {
                    warn!(session_id = session, error = %other, "Commit failed");
                    other.to_string()
                }
            };
            ServerFrame::reject(frame.id, detail)
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    match frame.to_json() {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(err) => {
            warn!(error = %err, "Failed to serialize server frame");
            Ok(())
        }
    }
}
