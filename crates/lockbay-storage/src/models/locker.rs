use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lockbay_core::wire::LockerView;
use lockbay_core::{LockerId, LockerState, OwnerKey, OwnerType};

use crate::error::{StorageError, StorageResult};

/// One physical locker door on one kiosk.
///
/// Rows are created at provisioning and never deleted; everything after
/// that is a guarded mutation. The `version` column is the optimistic
/// concurrency counter: every write increments it and predicates on the
/// value the writer previously read, so two racing transitions cannot
/// both land.
///
/// # Fields
///
/// * `kiosk_id` / `locker_id` - Composite primary key
/// * `state` - Lifecycle state as snake_case TEXT (`free`, `reserved`,
///   `opening`, `owned`, `blocked`, `error`)
/// * `owner_type` / `owner_key` - Principal holding the locker, NULL when free
/// * `reserved_at` / `owned_at` - When the current hold started
/// * `version` - Optimistic-concurrency counter
/// * `is_vip` - VIP lockers keep their owner across confirmed opens
/// * `display_name` - Optional label shown on the panel
///
/// Use `get_state()` / `get_owner_type()` to convert the raw TEXT
/// columns to their domain enums.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LockerRecord {
    pub kiosk_id: String,
    pub locker_id: i64,
    pub state: String,
    pub owner_type: Option<String>,
    pub owner_key: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub owned_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub is_vip: bool,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LockerRecord {
    /// Get the lifecycle state as an enum
    pub fn get_state(&self) -> StorageResult<LockerState> {
        self.state
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("unknown locker state '{}'", self.state)))
    }

    /// Get the owner type as an enum, if an owner is set
    pub fn get_owner_type(&self) -> StorageResult<Option<OwnerType>> {
        self.owner_type
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .map_err(|_| StorageError::Corrupt(format!("unknown owner type '{raw}'")))
            })
            .transpose()
    }

    /// Get the locker id as the domain newtype
    pub fn get_locker_id(&self) -> StorageResult<LockerId> {
        u16::try_from(self.locker_id)
            .ok()
            .and_then(|id| LockerId::new(id).ok())
            .ok_or_else(|| StorageError::Corrupt(format!("bad locker id {}", self.locker_id)))
    }

    /// Build the public API view of this row
    pub fn to_view(&self) -> StorageResult<LockerView> {
        let owner_key = self
            .owner_key
            .as_deref()
            .map(|raw| {
                OwnerKey::new(raw)
                    .map_err(|_| StorageError::Corrupt(format!("bad owner key '{raw}'")))
            })
            .transpose()?;

        Ok(LockerView {
            locker_id: self.get_locker_id()?,
            state: self.get_state()?,
            owner_type: self.get_owner_type()?,
            owner_key,
            reserved_at: self.reserved_at,
            owned_at: self.owned_at,
            version: self.version,
            is_vip: self.is_vip,
            display_name: self.display_name.clone(),
        })
    }
}

/// The columns one state transition writes, applied under the version
/// guard.
///
/// A mutation always carries the full owner picture: the UPDATE sets
/// every owner column, so "keep the owner" must be said explicitly via
/// [`LockerMutation::preserving`].
#[derive(Debug, Clone)]
pub struct LockerMutation {
    pub state: LockerState,
    pub owner_type: Option<OwnerType>,
    pub owner_key: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub owned_at: Option<DateTime<Utc>>,
}

impl LockerMutation {
    /// A transition that drops any owner (release, expire, reset, unblock).
    pub fn cleared(state: LockerState) -> Self {
        Self {
            state,
            owner_type: None,
            owner_key: None,
            reserved_at: None,
            owned_at: None,
        }
    }

    /// A transition that carries the current owner columns forward
    /// unchanged (open started, block, VIP confirm).
    pub fn preserving(record: &LockerRecord, state: LockerState) -> StorageResult<Self> {
        Ok(Self {
            state,
            owner_type: record.get_owner_type()?,
            owner_key: record.owner_key.clone(),
            reserved_at: record.reserved_at,
            owned_at: record.owned_at,
        })
    }
}
