//! SQLite connection pool.
//!
//! One pool per process. WAL journaling lets kiosk polls read while
//! command admission writes; the busy timeout absorbs the remaining
//! writer-vs-writer contention instead of surfacing `SQLITE_BUSY` to
//! handlers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::error::{StorageError, StorageResult};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool settings for the on-disk database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite file.
    pub database_path: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// Create the file on first open.
    pub create_if_missing: bool,

    /// Apply pending migrations right after connecting.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "lockbay.db".to_string(),
            max_connections: 10,
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    /// Connection options shared by every pooled connection.
    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {e}")))?;
        // NORMAL is durable enough under WAL and skips an fsync per
        // command admission.
        Ok(options
            .create_if_missing(self.create_if_missing)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging())
    }
}

/// Handle to the connection pool.
///
/// Cloning is cheap; repositories clone the pool itself, not this
/// wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database, creating the file and its parent directory
    /// when configured to, and migrate if `auto_migrate` is set.
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if config.create_if_missing
            && let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!("Failed to create database directory: {e}"))
            })?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options()?)
            .await?;

        let db = Self { pool };
        if config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// In-memory database for tests.
    ///
    /// Single connection: a second `:memory:` connection would open a
    /// different, empty database.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the workspace `migrations/` directory.
    ///
    /// The files are embedded at compile time by `sqlx::migrate!`, so a
    /// deployed binary carries its schema with it.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for active connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// One round trip to verify the pool can still serve queries.
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_overrides_defaults() {
        let config = DatabaseConfig::new("test.db")
            .max_connections(5)
            .create_if_missing(false)
            .auto_migrate(false);

        assert_eq!(config.database_path, "test.db");
        assert_eq!(config.max_connections, 5);
        assert!(!config.create_if_missing);
        assert!(!config.auto_migrate);
    }

    #[test]
    fn test_connect_options_accept_plain_and_nested_paths() {
        assert!(DatabaseConfig::new("lockbay.db").connect_options().is_ok());
        assert!(
            DatabaseConfig::new("/var/lib/lockbay/lockbay.db")
                .connect_options()
                .is_ok()
        );
    }
}
