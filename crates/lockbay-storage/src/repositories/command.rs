#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use lockbay_core::LockerId;

use crate::error::{StorageError, StorageResult};
use crate::models::{CommandOutcome, CommandRecord};
use crate::transaction;

/// Repository trait for the command queue.
///
/// Admission happens in [`enqueue`]: inside one transaction the queue is
/// checked for a live command with the same dedup key, then for any live
/// command touching one of the new command's target lockers, and only
/// then is the row inserted. A partial unique index on
/// `(kiosk_id, dedup_key)` over live rows backstops the window between
/// two concurrent checks.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
///
/// [`enqueue`]: CommandRepository::enqueue
pub trait CommandRepository: Send + Sync {
    /// Admit a new command to the queue, or reject it with
    /// [`StorageError::DuplicateCommand`] naming the live command that
    /// already covers it.
    async fn enqueue(&self, record: &CommandRecord, targets: &[LockerId]) -> StorageResult<()>;

    /// Fetch one command by id
    async fn find(&self, command_id: &str) -> StorageResult<Option<CommandRecord>>;

    /// Pending commands for one kiosk, oldest first
    async fn pending_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandRecord>>;

    /// Move a pending command to `executing` on behalf of `kiosk_id`.
    async fn claim(
        &self,
        command_id: &str,
        kiosk_id: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<CommandRecord>;

    /// Move an executing command to its terminal status and record the
    /// outcome columns.
    async fn finish(
        &self,
        command_id: &str,
        success: bool,
        outcome: &CommandOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<CommandRecord>;

    /// Executing commands claimed before `cutoff` (watchdog and boot
    /// recovery input)
    async fn stale_executing_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<CommandRecord>>;

    /// Latest commands for one kiosk regardless of status, newest first
    async fn recent_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandRecord>>;
}

/// SQLite implementation of CommandRepository
pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    /// Create a new SQLite command repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_live_by_dedup(
        &self,
        kiosk_id: &str,
        dedup_key: &str,
    ) -> StorageResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM commands
            WHERE kiosk_id = ? AND dedup_key = ? AND status IN ('pending', 'executing')
            LIMIT 1
            "#,
        )
        .bind(kiosk_id)
        .bind(dedup_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }
}

fn is_unique_violation(err: &StorageError) -> bool {
    match err {
        StorageError::Database(sqlx_err) => sqlx_err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation()),
        _ => false,
    }
}

const COMMAND_COLUMNS: &str = "id, kiosk_id, kind, payload, status, dedup_key, locker_id, \
     issued_by, retry_count, duration_ms, error_code, error_message, \
     created_at, claimed_at, finished_at";

impl CommandRepository for SqliteCommandRepository {
    async fn enqueue(&self, record: &CommandRecord, targets: &[LockerId]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing_id) =
            transaction::find_live_duplicate(&mut tx, &record.kiosk_id, &record.dedup_key).await?
        {
            return Err(StorageError::DuplicateCommand { existing_id });
        }

        for locker in targets {
            if let Some(existing_id) =
                transaction::find_live_on_locker(&mut tx, &record.kiosk_id, *locker).await?
            {
                return Err(StorageError::DuplicateCommand { existing_id });
            }
        }

        if let Err(err) = transaction::insert_command(&mut tx, record).await {
            // A racing enqueue can commit between our check and our
            // insert; the live-dedup unique index catches that and we
            // report it the same way as the up-front check.
            if is_unique_violation(&err) {
                drop(tx);
                let existing_id = self
                    .find_live_by_dedup(&record.kiosk_id, &record.dedup_key)
                    .await?
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(StorageError::DuplicateCommand { existing_id });
            }
            return Err(err);
        }

        transaction::insert_targets(&mut tx, &record.id, targets).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find(&self, command_id: &str) -> StorageResult<Option<CommandRecord>> {
        let record = sqlx::query_as::<_, CommandRecord>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?"
        ))
        .bind(command_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn pending_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS} FROM commands
            WHERE kiosk_id = ? AND status = 'pending'
            ORDER BY created_at, id
            LIMIT ?
            "#
        ))
        .bind(kiosk_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn claim(
        &self,
        command_id: &str,
        kiosk_id: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<CommandRecord> {
        let claimed = sqlx::query_as::<_, CommandRecord>(&format!(
            r#"
            UPDATE commands
            SET status = 'executing', claimed_at = ?
            WHERE id = ? AND kiosk_id = ? AND status = 'pending'
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(at)
        .bind(command_id)
        .bind(kiosk_id)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(record) => Ok(record),
            None => match self.find(command_id).await? {
                // A command addressed to another kiosk is invisible to
                // this one.
                Some(record) if record.kiosk_id == kiosk_id => {
                    Err(StorageError::CommandNotClaimable {
                        command_id: command_id.to_string(),
                        status: record.status,
                    })
                }
                _ => Err(StorageError::not_found("command", "id", command_id)),
            },
        }
    }

    async fn finish(
        &self,
        command_id: &str,
        success: bool,
        outcome: &CommandOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<CommandRecord> {
        let status = if success { "completed" } else { "failed" };
        let finished = sqlx::query_as::<_, CommandRecord>(&format!(
            r#"
            UPDATE commands
            SET status = ?, retry_count = ?, duration_ms = ?,
                error_code = ?, error_message = ?, finished_at = ?
            WHERE id = ? AND status = 'executing'
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(status)
        .bind(outcome.retry_count)
        .bind(outcome.duration_ms)
        .bind(&outcome.error_code)
        .bind(&outcome.error_message)
        .bind(at)
        .bind(command_id)
        .fetch_optional(&self.pool)
        .await?;

        match finished {
            Some(record) => Ok(record),
            None => match self.find(command_id).await? {
                Some(record) => Err(StorageError::CommandNotClaimable {
                    command_id: command_id.to_string(),
                    status: record.status,
                }),
                None => Err(StorageError::not_found("command", "id", command_id)),
            },
        }
    }

    async fn stale_executing_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS} FROM commands
            WHERE status = 'executing' AND claimed_at IS NOT NULL AND claimed_at < ?
            ORDER BY claimed_at
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn recent_for_kiosk(
        &self,
        kiosk_id: &str,
        limit: i64,
    ) -> StorageResult<Vec<CommandRecord>> {
        let records = sqlx::query_as::<_, CommandRecord>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS} FROM commands
            WHERE kiosk_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(kiosk_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
