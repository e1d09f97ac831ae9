//! Session coordination for the Questplay server.
//!
//! Owns the remote-play commit protocol: every event submitted by a peer
//! flows through [`SessionCoordinator`], which validates it against the
//! session's event counter and persists counter + event atomically. The
//! counter doubles as a monotonic sequence generator and an optimistic
//! lock, so racing writers are detected and rejected instead of silently
//! losing updates.

mod coordinator;
mod error;
mod ids;

pub use coordinator::SessionCoordinator;
pub use error::{SessionError, SessionResult};
pub use ids::{generate_secret, SessionIdGenerator, SECRET_LEN};
