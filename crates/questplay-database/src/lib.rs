//! SQLite database layer for the Questplay server.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Database migrations for the remote-play schema
//! - Model types for sessions, events, and session clients
//! - Query helpers used by the session coordinator
//!
//! # Architecture
//!
//! The `AsyncDatabase` uses a single dedicated thread for all SQLite
//! operations. Queries are sent through a channel and executed in FIFO
//! order.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let session = db.call(|conn| queries::get_session(conn, id)).await?;
//! ```
//!
//! **Important**: Only SQL operations should run inside `db.call()`.
//! Payload parsing and heavy computation must happen outside.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
