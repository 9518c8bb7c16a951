#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use lockbay_core::{LockerId, LockerState};

use crate::error::{StorageError, StorageResult};
use crate::models::{LockerMutation, LockerRecord};

/// Repository trait for locker rows.
///
/// Every state change goes through [`update_state`], which enforces the
/// optimistic version guard: the UPDATE predicates on the version the
/// caller read, and zero affected rows means someone else moved the
/// locker first.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
///
/// [`update_state`]: LockerRepository::update_state
pub trait LockerRepository: Send + Sync {
    /// Create rows for any of `lockers` that do not exist yet, in the
    /// `free` state. Returns how many rows were created.
    async fn create_missing(&self, kiosk_id: &str, lockers: &[LockerId]) -> StorageResult<u64>;

    /// Fetch one locker row
    async fn find(&self, kiosk_id: &str, locker: LockerId) -> StorageResult<Option<LockerRecord>>;

    /// All lockers on one kiosk, in locker-id order
    async fn list_for_kiosk(&self, kiosk_id: &str) -> StorageResult<Vec<LockerRecord>>;

    /// Apply a state transition under the version guard, returning the
    /// updated row.
    async fn update_state(
        &self,
        kiosk_id: &str,
        locker: LockerId,
        expected_version: i64,
        change: &LockerMutation,
    ) -> StorageResult<LockerRecord>;

    /// Update the VIP flag and display label. Bumps the version but
    /// takes no guard; profile edits are idempotent.
    async fn set_profile(
        &self,
        kiosk_id: &str,
        locker: LockerId,
        is_vip: bool,
        display_name: Option<&str>,
    ) -> StorageResult<LockerRecord>;

    /// Every locker in `state`, across all kiosks (boot recovery)
    async fn list_in_state(&self, state: LockerState) -> StorageResult<Vec<LockerRecord>>;

    /// Reserved lockers whose hold started before `cutoff` (TTL sweep)
    async fn list_reserved_before(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<LockerRecord>>;
}

/// SQLite implementation of LockerRepository
pub struct SqliteLockerRepository {
    pool: SqlitePool,
}

impl SqliteLockerRepository {
    /// Create a new SQLite locker repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const LOCKER_COLUMNS: &str = "kiosk_id, locker_id, state, owner_type, owner_key, \
     reserved_at, owned_at, version, is_vip, display_name, created_at, updated_at";

impl LockerRepository for SqliteLockerRepository {
    async fn create_missing(&self, kiosk_id: &str, lockers: &[LockerId]) -> StorageResult<u64> {
        let mut created = 0;
        for locker in lockers {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO lockers (kiosk_id, locker_id) VALUES (?, ?)",
            )
            .bind(kiosk_id)
            .bind(i64::from(locker.as_u16()))
            .execute(&self.pool)
            .await?;
            created += result.rows_affected();
        }

        Ok(created)
    }

    async fn find(&self, kiosk_id: &str, locker: LockerId) -> StorageResult<Option<LockerRecord>> {
        let record = sqlx::query_as::<_, LockerRecord>(&format!(
            "SELECT {LOCKER_COLUMNS} FROM lockers WHERE kiosk_id = ? AND locker_id = ?"
        ))
        .bind(kiosk_id)
        .bind(i64::from(locker.as_u16()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_for_kiosk(&self, kiosk_id: &str) -> StorageResult<Vec<LockerRecord>> {
        let records = sqlx::query_as::<_, LockerRecord>(&format!(
            "SELECT {LOCKER_COLUMNS} FROM lockers WHERE kiosk_id = ? ORDER BY locker_id"
        ))
        .bind(kiosk_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_state(
        &self,
        kiosk_id: &str,
        locker: LockerId,
        expected_version: i64,
        change: &LockerMutation,
    ) -> StorageResult<LockerRecord> {
        let updated = sqlx::query_as::<_, LockerRecord>(&format!(
            r#"
            UPDATE lockers
            SET state = ?, owner_type = ?, owner_key = ?, reserved_at = ?,
                owned_at = ?, version = version + 1, updated_at = ?
            WHERE kiosk_id = ? AND locker_id = ? AND version = ?
            RETURNING {LOCKER_COLUMNS}
            "#
        ))
        .bind(change.state.as_str())
        .bind(change.owner_type.map(|t| t.as_str()))
        .bind(&change.owner_key)
        .bind(change.reserved_at)
        .bind(change.owned_at)
        .bind(Utc::now())
        .bind(kiosk_id)
        .bind(i64::from(locker.as_u16()))
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(record),
            // Zero rows: either the locker does not exist or its version
            // moved. Re-read to tell the two apart.
            None => match self.find(kiosk_id, locker).await? {
                Some(_) => Err(StorageError::VersionConflict {
                    kiosk_id: kiosk_id.to_string(),
                    locker_id: i64::from(locker.as_u16()),
                    expected: expected_version,
                }),
                None => Err(StorageError::not_found(
                    "locker",
                    "kiosk_id/locker_id",
                    format!("{kiosk_id}/{locker}"),
                )),
            },
        }
    }

    async fn set_profile(
        &self,
        kiosk_id: &str,
        locker: LockerId,
        is_vip: bool,
        display_name: Option<&str>,
    ) -> StorageResult<LockerRecord> {
        let updated = sqlx::query_as::<_, LockerRecord>(&format!(
            r#"
            UPDATE lockers
            SET is_vip = ?, display_name = ?, version = version + 1, updated_at = ?
            WHERE kiosk_id = ? AND locker_id = ?
            RETURNING {LOCKER_COLUMNS}
            "#
        ))
        .bind(is_vip)
        .bind(display_name)
        .bind(Utc::now())
        .bind(kiosk_id)
        .bind(i64::from(locker.as_u16()))
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            StorageError::not_found("locker", "kiosk_id/locker_id", format!("{kiosk_id}/{locker}"))
        })
    }

    async fn list_in_state(&self, state: LockerState) -> StorageResult<Vec<LockerRecord>> {
        let records = sqlx::query_as::<_, LockerRecord>(&format!(
            "SELECT {LOCKER_COLUMNS} FROM lockers WHERE state = ? ORDER BY kiosk_id, locker_id"
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn list_reserved_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<LockerRecord>> {
        let records = sqlx::query_as::<_, LockerRecord>(&format!(
            r#"
            SELECT {LOCKER_COLUMNS} FROM lockers
            WHERE state = 'reserved' AND reserved_at IS NOT NULL AND reserved_at < ?
            ORDER BY kiosk_id, locker_id
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
