#![allow(async_fn_in_trait)]

use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::models::CommandLogEntry;
use crate::transaction;

/// Repository trait for the append-only command audit trail.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
pub trait CommandLogRepository: Send + Sync {
    /// Append one entry, returning it with the assigned row id
    async fn append(&self, entry: &CommandLogEntry) -> StorageResult<CommandLogEntry>;

    /// Full trail for one command, oldest first
    async fn for_command(&self, command_id: &str) -> StorageResult<Vec<CommandLogEntry>>;

    /// Latest entries for one kiosk, newest first
    async fn recent_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandLogEntry>>;
}

/// SQLite implementation of CommandLogRepository
pub struct SqliteCommandLogRepository {
    pool: SqlitePool,
}

impl SqliteCommandLogRepository {
    /// Create a new SQLite command log repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl CommandLogRepository for SqliteCommandLogRepository {
    async fn append(&self, entry: &CommandLogEntry) -> StorageResult<CommandLogEntry> {
        let mut tx = self.pool.begin().await?;
        let id = transaction::append_log(&mut tx, entry).await?;
        tx.commit().await?;

        let mut stored = entry.clone();
        stored.id = id;
        Ok(stored)
    }

    async fn for_command(&self, command_id: &str) -> StorageResult<Vec<CommandLogEntry>> {
        let entries = sqlx::query_as::<_, CommandLogEntry>(
            r#"
            SELECT id, command_id, kiosk_id, event, detail, created_at
            FROM command_log
            WHERE command_id = ?
            ORDER BY id
            "#,
        )
        .bind(command_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn recent_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandLogEntry>> {
        let entries = sqlx::query_as::<_, CommandLogEntry>(
            r#"
            SELECT id, command_id, kiosk_id, event, detail, created_at
            FROM command_log
            WHERE kiosk_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(kiosk_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
