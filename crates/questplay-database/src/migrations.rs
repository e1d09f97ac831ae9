//! Database migrations.
//!
//! This module contains all SQL migrations for the remote-play schema.
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    // Create migrations tracking table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_initial_schema(conn)?;
    }
    if current_version < 2 {
        migrate_v2_event_client_columns(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Initial schema - sessions, events, session_clients.
fn migrate_v1_initial_schema(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: initial schema");

    // sessions table
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            secret TEXT NOT NULL,
            event_counter INTEGER NOT NULL DEFAULT 0,
            locked INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_secret
            ON sessions(secret);
        ",
    )?;

    // events table - append-only, dense per-session sequence
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            id INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            json TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (session_id, id)
        );
        ",
    )?;

    // session_clients table - join-time capability records
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS session_clients (
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            client TEXT NOT NULL,
            secret TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (session_id, client)
        );

        CREATE INDEX IF NOT EXISTS idx_session_clients_client
            ON session_clients(client);
        ",
    )?;

    record_migration(conn, 1, "initial_schema")?;
    Ok(())
}

/// V2: Add client/instance columns to events.
///
/// The first schema keyed duplicate detection on payload alone. The current
/// protocol de-duplicates on the full (client, instance, type, json) tuple,
/// so committed events record who wrote them and from which connection.
fn migrate_v2_event_client_columns(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: event client columns");

    conn.execute_batch(
        "
        ALTER TABLE events ADD COLUMN client TEXT;
        ALTER TABLE events ADD COLUMN instance TEXT;
        ",
    )?;

    record_migration(conn, 2, "event_client_columns")?;
    Ok(())
}
