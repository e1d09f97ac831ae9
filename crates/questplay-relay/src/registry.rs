//! Per-session peer connection registry.
//!
//! Replaces the ambient global session/socket map with an explicit,
//! `Arc`-shared registry indexed by session id. Each WebSocket connection
//! registers on open and is removed on close (or when its channel backs up
//! beyond capacity); broadcast fan-out walks the session's peers only.

use crate::{RelayError, RelayResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Outbound channel capacity per connection.
const PEER_CHANNEL_CAPACITY: usize = 64;

struct Peer {
    client: Option<String>,
    tx: mpsc::Sender<String>,
}

/// Handle returned on registration; identifies the connection for
/// `unregister` and carries the receiving end of its outbound channel.
pub struct ConnectionHandle {
    pub session: i64,
    pub connection_id: u64,
    pub rx: mpsc::Receiver<String>,
}

/// Registry of live WebSocket connections, indexed by session id.
///
/// Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    sessions: Arc<RwLock<HashMap<i64, HashMap<u64, Peer>>>>,
    next_connection_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for a session.
    pub async fn register(&self, session: i64, client: Option<String>) -> ConnectionHandle {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(PEER_CHANNEL_CAPACITY);

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session)
            .or_default()
            .insert(connection_id, Peer { client, tx });

        debug!(session_id = session, connection_id, "Peer connected");
        ConnectionHandle {
            session,
            connection_id,
            rx,
        }
    }

    /// Remove a connection. Empty session entries are dropped.
    pub async fn unregister(&self, session: i64, connection_id: u64) {
        let mut sessions = self.sessions.write().await;
        if let Some(peers) = sessions.get_mut(&session) {
            peers.remove(&connection_id);
            if peers.is_empty() {
                sessions.remove(&session);
            }
        }
        debug!(session_id = session, connection_id, "Peer disconnected");
    }

    /// Send a text frame to every peer in a session, optionally excluding
    /// one connection (typically the submitter, who gets a commit reply
    /// instead). Returns the number of peers reached.
    pub async fn broadcast(
        &self,
        session: i64,
        text: &str,
        exclude: Option<u64>,
    ) -> RelayResult<usize> {
        let sessions = self.sessions.read().await;
        let peers = match sessions.get(&session) {
            Some(peers) => peers,
            None => return Ok(0),
        };

        let mut reached = 0;
        for (&connection_id, peer) in peers {
            if Some(connection_id) == exclude {
                continue;
            }
            match peer.tx.try_send(text.to_string()) {
                Ok(()) => reached += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // A slow consumer misses this frame; it resynchronizes
                    // through the catch-up fetch on its own.
                    warn!(
                        session_id = session,
                        connection_id,
                        client = ?peer.client,
                        "Peer channel full, dropping broadcast frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(session_id = session, connection_id, "Peer channel closed");
                }
            }
        }
        Ok(reached)
    }

    /// Send a text frame to a single connection.
    pub async fn send_to(&self, session: i64, connection_id: u64, text: &str) -> RelayResult<()> {
        let sessions = self.sessions.read().await;
        let peer = sessions
            .get(&session)
            .and_then(|peers| peers.get(&connection_id))
            .ok_or_else(|| RelayError::Send(format!("Unknown connection {}", connection_id)))?;

        peer.tx
            .send(text.to_string())
            .await
            .map_err(|e| RelayError::Send(e.to_string()))
    }

    /// Number of live connections in a session.
    pub async fn peer_count(&self, session: i64) -> usize {
        let sessions = self.sessions.read().await;
        sessions.get(&session).map(|p| p.len()).unwrap_or(0)
    }
}
