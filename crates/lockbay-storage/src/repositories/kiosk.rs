#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::KioskRecord;

/// Repository trait for the kiosk registry.
///
/// Kiosks register themselves by heartbeating; there is no separate
/// provisioning call. A heartbeat that omits a descriptive field keeps
/// whatever the registry already knows.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
pub trait KioskRepository: Send + Sync {
    /// Insert or refresh one kiosk row from a heartbeat.
    async fn register_heartbeat(
        &self,
        kiosk_id: &str,
        zone: Option<&str>,
        version: Option<&str>,
        hardware_id: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<KioskRecord>;

    /// Fetch one kiosk row
    async fn find(&self, kiosk_id: &str) -> StorageResult<Option<KioskRecord>>;

    /// All registered kiosks, in id order
    async fn list(&self) -> StorageResult<Vec<KioskRecord>>;

    /// Fold a hardware command result into the consecutive-error streak
    /// and return the new streak value.
    async fn record_hardware_result(&self, kiosk_id: &str, success: bool) -> StorageResult<i64>;
}

/// SQLite implementation of KioskRepository
pub struct SqliteKioskRepository {
    pool: SqlitePool,
}

impl SqliteKioskRepository {
    /// Create a new SQLite kiosk repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const KIOSK_COLUMNS: &str = "kiosk_id, zone, version, hardware_id, last_seen_at, \
     hardware_error_streak, created_at, updated_at";

impl KioskRepository for SqliteKioskRepository {
    async fn register_heartbeat(
        &self,
        kiosk_id: &str,
        zone: Option<&str>,
        version: Option<&str>,
        hardware_id: Option<&str>,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<KioskRecord> {
        let record = sqlx::query_as::<_, KioskRecord>(&format!(
            r#"
            INSERT INTO kiosks (kiosk_id, zone, version, hardware_id, last_seen_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(kiosk_id) DO UPDATE SET
                zone = COALESCE(excluded.zone, kiosks.zone),
                version = COALESCE(excluded.version, kiosks.version),
                hardware_id = COALESCE(excluded.hardware_id, kiosks.hardware_id),
                last_seen_at = excluded.last_seen_at,
                updated_at = excluded.last_seen_at
            RETURNING {KIOSK_COLUMNS}
            "#
        ))
        .bind(kiosk_id)
        .bind(zone)
        .bind(version)
        .bind(hardware_id)
        .bind(seen_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find(&self, kiosk_id: &str) -> StorageResult<Option<KioskRecord>> {
        let record = sqlx::query_as::<_, KioskRecord>(&format!(
            "SELECT {KIOSK_COLUMNS} FROM kiosks WHERE kiosk_id = ?"
        ))
        .bind(kiosk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list(&self) -> StorageResult<Vec<KioskRecord>> {
        let records = sqlx::query_as::<_, KioskRecord>(&format!(
            "SELECT {KIOSK_COLUMNS} FROM kiosks ORDER BY kiosk_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn record_hardware_result(&self, kiosk_id: &str, success: bool) -> StorageResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE kiosks
            SET hardware_error_streak = CASE WHEN ? THEN 0 ELSE hardware_error_streak + 1 END,
                updated_at = ?
            WHERE kiosk_id = ?
            RETURNING hardware_error_streak
            "#,
        )
        .bind(success)
        .bind(Utc::now())
        .bind(kiosk_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(streak,)| streak)
            .ok_or_else(|| StorageError::not_found("kiosk", "kiosk_id", kiosk_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use chrono::Duration;
    use lockbay_core::KioskStatus;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_first_heartbeat_registers() {
        let db = setup_test_db().await;
        let repo = SqliteKioskRepository::new(db.pool().clone());

        let record = repo
            .register_heartbeat("kiosk-01", Some("north"), Some("2.4.1"), Some("rpi-8842"), Utc::now())
            .await
            .unwrap();
        assert_eq!(record.kiosk_id, "kiosk-01");
        assert_eq!(record.zone.as_deref(), Some("north"));
        assert_eq!(record.hardware_error_streak, 0);
        assert_eq!(record.status(Utc::now(), Duration::seconds(90)), KioskStatus::Online);
    }

    #[tokio::test]
    async fn test_sparse_heartbeat_keeps_known_fields() {
        let db = setup_test_db().await;
        let repo = SqliteKioskRepository::new(db.pool().clone());

        let first_seen = Utc::now() - Duration::seconds(30);
        repo.register_heartbeat("kiosk-01", Some("north"), Some("2.4.1"), None, first_seen)
            .await
            .unwrap();

        // Routine heartbeats send only the id; identity fields survive.
        let refreshed = repo
            .register_heartbeat("kiosk-01", None, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(refreshed.zone.as_deref(), Some("north"));
        assert_eq!(refreshed.version.as_deref(), Some("2.4.1"));
        assert!(refreshed.last_seen_at > first_seen);
    }

    #[tokio::test]
    async fn test_streak_counts_and_resets() {
        let db = setup_test_db().await;
        let repo = SqliteKioskRepository::new(db.pool().clone());
        repo.register_heartbeat("kiosk-01", None, None, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.record_hardware_result("kiosk-01", false).await.unwrap(), 1);
        assert_eq!(repo.record_hardware_result("kiosk-01", false).await.unwrap(), 2);
        assert_eq!(repo.record_hardware_result("kiosk-01", true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_streak_for_unknown_kiosk_is_not_found() {
        let db = setup_test_db().await;
        let repo = SqliteKioskRepository::new(db.pool().clone());

        let err = repo.record_hardware_result("ghost", false).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
