//! Transaction-aware queue and layout operations.
//!
//! These functions accept a SQLite transaction reference so multistep
//! operations commit or roll back as one unit. The two places that
//! depend on this are queue admission (duplicate check + command insert
//! + target expansion must be atomic against concurrent submitters) and
//! zone replacement (the old layout must stay intact until the new one
//! is fully written).
//!
//! # Usage Pattern
//!
//! ```no_run
//! use lockbay_storage::{Database, transaction};
//! use lockbay_storage::models::CommandRecord;
//! use lockbay_core::{CommandPayload, LockerId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let payload = CommandPayload::Open {
//!     locker_id: LockerId::new(5)?,
//!     burst: false,
//! };
//! let record = CommandRecord::new(&"kiosk-01".parse()?, &payload, None)?;
//!
//! let mut tx = db.pool().begin().await?;
//! if transaction::find_live_duplicate(&mut tx, &record.kiosk_id, &record.dedup_key)
//!     .await?
//!     .is_none()
//! {
//!     transaction::insert_command(&mut tx, &record).await?;
//!     transaction::insert_targets(&mut tx, &record.id, &payload.target_lockers()).await?;
//!     tx.commit().await?;
//! }
//! # Ok(())
//! # }
//! ```

use sqlx::{Sqlite, Transaction};

use lockbay_core::types::SlaveAddress;
use lockbay_core::zone::{LockerRange, Zone};
use lockbay_core::LockerId;

use crate::error::StorageResult;
use crate::models::{CommandLogEntry, CommandRecord};

/// Find a live (pending or executing) command with the same dedup key.
///
/// Returns the existing command id, which the conflict response carries
/// back to the issuer.
pub async fn find_live_duplicate(
    tx: &mut Transaction<'_, Sqlite>,
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
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| r.0))
}

/// Find a live command already targeting `locker` on the same kiosk.
///
/// Bulk commands participate through their expanded `command_targets`
/// rows, so a bulk open holds every one of its lockers against
/// overlapping submissions.
pub async fn find_live_on_locker(
    tx: &mut Transaction<'_, Sqlite>,
    kiosk_id: &str,
    locker: LockerId,
) -> StorageResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT c.id FROM commands c
        JOIN command_targets t ON t.command_id = c.id
        WHERE c.kiosk_id = ? AND t.locker_id = ? AND c.status IN ('pending', 'executing')
        LIMIT 1
        "#,
    )
    .bind(kiosk_id)
    .bind(i64::from(locker.as_u16()))
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| r.0))
}

/// Insert a command row within a transaction
pub async fn insert_command(
    tx: &mut Transaction<'_, Sqlite>,
    record: &CommandRecord,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO commands (
            id, kiosk_id, kind, payload, status, dedup_key, locker_id,
            issued_by, retry_count, duration_ms, error_code, error_message,
            created_at, claimed_at, finished_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.kiosk_id)
    .bind(&record.kind)
    .bind(&record.payload)
    .bind(&record.status)
    .bind(&record.dedup_key)
    .bind(record.locker_id)
    .bind(&record.issued_by)
    .bind(record.retry_count)
    .bind(record.duration_ms)
    .bind(&record.error_code)
    .bind(&record.error_message)
    .bind(record.created_at)
    .bind(record.claimed_at)
    .bind(record.finished_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Insert the expanded target set for a command within a transaction
pub async fn insert_targets(
    tx: &mut Transaction<'_, Sqlite>,
    command_id: &str,
    lockers: &[LockerId],
) -> StorageResult<()> {
    for locker in lockers {
        sqlx::query("INSERT INTO command_targets (command_id, locker_id) VALUES (?, ?)")
            .bind(command_id)
            .bind(i64::from(locker.as_u16()))
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Append an audit row within a transaction
pub async fn append_log(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &CommandLogEntry,
) -> StorageResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO command_log (command_id, kiosk_id, event, detail, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.command_id)
    .bind(&entry.kiosk_id)
    .bind(&entry.event)
    .bind(&entry.detail)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert a zone header row, returning its generated id
pub async fn insert_zone(
    tx: &mut Transaction<'_, Sqlite>,
    kiosk_id: &str,
    zone: &Zone,
    ordinal: i64,
) -> StorageResult<i64> {
    let result = sqlx::query(
        "INSERT INTO zones (kiosk_id, name, ordinal, enabled) VALUES (?, ?, ?, ?)",
    )
    .bind(kiosk_id)
    .bind(&zone.name)
    .bind(ordinal)
    .bind(zone.enabled)
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert one locker-id range for a zone
pub async fn insert_zone_range(
    tx: &mut Transaction<'_, Sqlite>,
    zone_id: i64,
    ordinal: i64,
    range: &LockerRange,
) -> StorageResult<()> {
    sqlx::query(
        "INSERT INTO zone_ranges (zone_id, ordinal, start_locker, end_locker) VALUES (?, ?, ?, ?)",
    )
    .bind(zone_id)
    .bind(ordinal)
    .bind(i64::from(range.start()))
    .bind(i64::from(range.end()))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Insert one relay card, optionally assigned to a zone slot
pub async fn insert_relay_card(
    tx: &mut Transaction<'_, Sqlite>,
    kiosk_id: &str,
    card: SlaveAddress,
    zone_id: Option<i64>,
    zone_ordinal: Option<i64>,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO relay_cards (kiosk_id, slave_address, zone_id, zone_ordinal, enabled)
        VALUES (?, ?, ?, ?, 1)
        "#,
    )
    .bind(kiosk_id)
    .bind(i64::from(card.as_u8()))
    .bind(zone_id)
    .bind(zone_ordinal)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
