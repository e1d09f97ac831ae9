//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so the same
//! helpers run inside and outside coordinator transactions.

use crate::{DatabaseResult, NewEvent, NewSession, Session, SessionClientRecord, StoredEvent};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

// ==========================================
// Sessions
// ==========================================

/// Insert a new session with a zeroed event counter.
pub fn insert_session(conn: &Connection, session: &NewSession) -> DatabaseResult<Session> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sessions (id, secret, event_counter, locked, created_at)
         VALUES (?1, ?2, 0, 0, ?3)",
        params![session.id, session.secret, now],
    )?;
    debug!(session_id = session.id, "Session created");
    Ok(Session {
        id: session.id,
        secret: session.secret.clone(),
        event_counter: 0,
        locked: false,
        created_at: parse_datetime(now),
    })
}

/// Get a session by ID.
pub fn get_session(conn: &Connection, id: i64) -> DatabaseResult<Option<Session>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, secret, event_counter, locked, created_at
         FROM sessions WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], map_session);

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get a session by join secret.
///
/// Locked sessions are invisible to join-by-secret; knowing the secret of a
/// locked session grants nothing.
pub fn get_session_by_secret(conn: &Connection, secret: &str) -> DatabaseResult<Option<Session>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, secret, event_counter, locked, created_at
         FROM sessions WHERE secret = ?1 AND locked = 0",
    )?;

    let result = stmt.query_row(params![secret], map_session);

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Conditionally advance a session's event counter.
///
/// Succeeds only if the row's counter still equals `expected` at write
/// time. A false return means another writer advanced the counter since
/// the caller read it.
pub fn advance_counter(conn: &Connection, id: i64, expected: i64, new: i64) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE sessions SET event_counter = ?1 WHERE id = ?2 AND event_counter = ?3",
        params![new, id, expected],
    )?;
    Ok(count > 0)
}

/// Set the locked flag on a session.
pub fn set_locked(conn: &Connection, id: i64, locked: bool) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE sessions SET locked = ?1 WHERE id = ?2",
        params![locked, id],
    )?;
    Ok(count > 0)
}

// ==========================================
// Events
// ==========================================

/// Idempotent event write keyed by (session_id, id).
///
/// If a row with the same key already exists the write is a no-op that
/// still reports success. The coordinator verifies payload equality before
/// treating a pre-existing row as a successful retry; this function does
/// not diff content.
pub fn upsert_event(conn: &Connection, event: &NewEvent) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO events (session_id, id, client, instance, event_type, json, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.session_id,
            event.id,
            event.client,
            event.instance,
            event.event_type,
            event.json,
            now,
        ],
    )?;
    Ok(true)
}

/// Get the event with the highest id for a session, if any.
pub fn get_last_event(conn: &Connection, session_id: i64) -> DatabaseResult<Option<StoredEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, id, client, instance, event_type, json, timestamp
         FROM events WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
    )?;

    let result = stmt.query_row(params![session_id], map_event);

    match result {
        Ok(event) => Ok(Some(event)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get the event at a specific sequence number.
pub fn get_event_by_id(
    conn: &Connection,
    session_id: i64,
    id: i64,
) -> DatabaseResult<Option<StoredEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, id, client, instance, event_type, json, timestamp
         FROM events WHERE session_id = ?1 AND id = ?2",
    )?;

    let result = stmt.query_row(params![session_id, id], map_event);

    match result {
        Ok(event) => Ok(Some(event)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get all events with id > start, ascending by id.
///
/// This is the replay primitive for reconnecting clients; callers may
/// re-invoke with the last id they received.
pub fn get_events_after(
    conn: &Connection,
    session_id: i64,
    start: i64,
) -> DatabaseResult<Vec<StoredEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, id, client, instance, event_type, json, timestamp
         FROM events WHERE session_id = ?1 AND id > ?2 ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![session_id, start], map_event)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ==========================================
// Session clients
// ==========================================

/// Record a participant's membership in a session (upsert).
pub fn upsert_session_client(
    conn: &Connection,
    session_id: i64,
    client: &str,
    secret: &str,
) -> DatabaseResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO session_clients (session_id, client, secret, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id, client) DO UPDATE SET secret = ?3",
        params![session_id, client, secret, now],
    )?;
    debug!(session_id, client, "Session client recorded");
    Ok(())
}

/// Check that (session, client, secret) matches a join record.
///
/// Consulted before authorizing a WebSocket upgrade.
pub fn verify_session_client(
    conn: &Connection,
    session_id: i64,
    client: &str,
    secret: &str,
) -> DatabaseResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM session_clients
         WHERE session_id = ?1 AND client = ?2 AND secret = ?3",
        params![session_id, client, secret],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List a client's session memberships, most recent first.
pub fn get_sessions_by_client(
    conn: &Connection,
    client: &str,
) -> DatabaseResult<Vec<SessionClientRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT session_id, client, secret, created_at
         FROM session_clients WHERE client = ?1 ORDER BY created_at DESC",
    )?;

    let records = stmt
        .query_map(params![client], |row| {
            Ok(SessionClientRecord {
                session_id: row.get(0)?,
                client: row.get(1)?,
                secret: row.get(2)?,
                created_at: parse_datetime(row.get::<_, String>(3)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

// ==========================================
// Helpers
// ==========================================

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        secret: row.get(1)?,
        event_counter: row.get(2)?,
        locked: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        session_id: row.get(0)?,
        id: row.get(1)?,
        client: row.get(2)?,
        instance: row.get(3)?,
        event_type: row.get(4)?,
        json: row.get(5)?,
        timestamp: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Parse an RFC3339 datetime string, falling back to current time on error.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
