//! Shared application state.

use questplay_database::AsyncDatabase;
use questplay_relay::ConnectionRegistry;
use questplay_sessions::SessionCoordinator;

/// State shared by every handler. Cloning is cheap; all clones share the
/// same database executor and connection registry.
#[derive(Clone)]
pub struct AppState {
    pub db: AsyncDatabase,
    pub coordinator: SessionCoordinator,
    pub registry: ConnectionRegistry,
}

impl AppState {
    pub fn new(db: AsyncDatabase) -> Self {
        let coordinator = SessionCoordinator::new(db.clone());
        Self {
            db,
            coordinator,
            registry: ConnectionRegistry::new(),
        }
    }
}
