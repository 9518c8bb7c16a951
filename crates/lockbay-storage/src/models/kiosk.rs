use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use lockbay_core::types::{KioskId, KioskStatus};
use lockbay_core::wire::KioskSummary;

use crate::error::{StorageError, StorageResult};

/// Registry row for one kiosk daemon.
///
/// Liveness is never stored; it is derived from `last_seen_at` against
/// the configured offline threshold whenever the row is read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KioskRecord {
    pub kiosk_id: String,
    pub zone: Option<String>,
    pub version: Option<String>,
    pub hardware_id: Option<String>,
    pub last_seen_at: DateTime<Utc>,
    /// Consecutive hardware-failed commands; resets on first success
    pub hardware_error_streak: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KioskRecord {
    /// Derive liveness from the last heartbeat.
    pub fn status(&self, now: DateTime<Utc>, offline_after: Duration) -> KioskStatus {
        if now - self.last_seen_at > offline_after {
            KioskStatus::Offline
        } else {
            KioskStatus::Online
        }
    }

    /// Build the registry view of this row.
    pub fn to_summary(
        &self,
        now: DateTime<Utc>,
        offline_after: Duration,
    ) -> StorageResult<KioskSummary> {
        let kiosk_id = KioskId::new(&self.kiosk_id)
            .map_err(|_| StorageError::Corrupt(format!("bad kiosk id '{}'", self.kiosk_id)))?;

        Ok(KioskSummary {
            kiosk_id,
            zone: self.zone.clone(),
            version: self.version.clone(),
            hardware_id: self.hardware_id.clone(),
            last_seen_at: self.last_seen_at,
            status: self.status(now, offline_after),
            hardware_error_streak: self.hardware_error_streak,
        })
    }
}
