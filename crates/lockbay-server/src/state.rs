use std::sync::Arc;

use lockbay_storage::{
    Database, SqliteCommandLogRepository, SqliteCommandRepository, SqliteKioskRepository,
    SqliteLockerRepository, SqliteZoneRepository,
};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (the database wraps a pool, the config is
/// behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection pool wrapper.
    pub db: Database,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn commands(&self) -> SqliteCommandRepository {
        SqliteCommandRepository::new(self.db.pool().clone())
    }

    pub fn lockers(&self) -> SqliteLockerRepository {
        SqliteLockerRepository::new(self.db.pool().clone())
    }

    pub fn kiosks(&self) -> SqliteKioskRepository {
        SqliteKioskRepository::new(self.db.pool().clone())
    }

    pub fn zones(&self) -> SqliteZoneRepository {
        SqliteZoneRepository::new(self.db.pool().clone())
    }

    pub fn command_log(&self) -> SqliteCommandLogRepository {
        SqliteCommandLogRepository::new(self.db.pool().clone())
    }
}
