//! WebSocket plumbing for remote-play sessions.
//!
//! This crate provides:
//! - The wire frames peers exchange (event submissions and
//!   INFLIGHT_COMMIT / INFLIGHT_REJECT replies)
//! - A connection registry indexed by session id, owning the fan-out of
//!   committed events to peers

mod error;
mod messages;
mod registry;

pub use error::{RelayError, RelayResult};
pub use messages::{EventFrame, ServerFrame};
pub use registry::{ConnectionHandle, ConnectionRegistry};
