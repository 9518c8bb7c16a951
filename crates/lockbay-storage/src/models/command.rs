use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lockbay_core::command::{CommandId, CommandKind, CommandPayload, CommandStatus};
use lockbay_core::types::KioskId;
use lockbay_core::wire::CommandDescriptor;

use crate::error::{StorageError, StorageResult};

/// One queued command row.
///
/// The payload is stored as its tagged JSON form; `kind`, `dedup_key`
/// and `locker_id` are denormalized from it at insert so the queue
/// indexes never need to parse JSON. After insert only `status`,
/// `retry_count` and the completion columns move.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommandRecord {
    /// Command id (UUID v4) as TEXT
    pub id: String,
    pub kiosk_id: String,
    /// Payload discriminant (`open`, `bulk_open`, ...)
    pub kind: String,
    /// Tagged JSON payload
    pub payload: String,
    /// Lifecycle status (`pending`, `executing`, `completed`, `failed`)
    pub status: String,
    /// Canonical equivalence key for the enqueue conflict check
    pub dedup_key: String,
    /// Primary target, NULL for bulk and buzzer commands
    pub locker_id: Option<i64>,
    /// Operator or subsystem that submitted the command
    pub issued_by: Option<String>,
    /// Hardware attempts the executor reported (1 = first try worked)
    pub retry_count: i64,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CommandRecord {
    /// Build a fresh pending row for `payload`, assigning its id.
    pub fn new(
        kiosk_id: &KioskId,
        payload: &CommandPayload,
        issued_by: Option<String>,
    ) -> StorageResult<Self> {
        let json = serde_json::to_string(payload)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            kiosk_id: kiosk_id.to_string(),
            kind: payload.kind().to_string(),
            payload: json,
            status: CommandStatus::Pending.to_string(),
            dedup_key: payload.dedup_key(),
            locker_id: payload.primary_locker().map(|l| i64::from(l.as_u16())),
            issued_by,
            retry_count: 0,
            duration_ms: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            claimed_at: None,
            finished_at: None,
        })
    }

    /// Get the command id as a UUID
    pub fn command_id(&self) -> StorageResult<CommandId> {
        Uuid::parse_str(&self.id)
            .map_err(|_| StorageError::Corrupt(format!("bad command id '{}'", self.id)))
    }

    /// Get the lifecycle status as an enum
    pub fn get_status(&self) -> StorageResult<CommandStatus> {
        self.status
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("unknown command status '{}'", self.status)))
    }

    /// Get the payload discriminant as an enum
    pub fn get_kind(&self) -> StorageResult<CommandKind> {
        self.kind
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("unknown command kind '{}'", self.kind)))
    }

    /// Deserialize the stored payload
    pub fn get_payload(&self) -> StorageResult<CommandPayload> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// True while the command still occupies its dedup slot
    pub fn is_live(&self) -> bool {
        matches!(self.status.as_str(), "pending" | "executing")
    }

    /// Build the descriptor handed to a polling kiosk
    pub fn to_descriptor(&self) -> StorageResult<CommandDescriptor> {
        Ok(CommandDescriptor {
            id: self.command_id()?,
            kind: self.get_kind()?,
            payload: self.get_payload()?,
            created_at: self.created_at,
        })
    }
}

/// Completion columns written when a command reaches a terminal status.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub retry_count: i64,
    pub duration_ms: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl CommandOutcome {
    /// Outcome of a clean success.
    pub fn success(duration_ms: i64, retry_count: i64) -> Self {
        Self {
            retry_count,
            duration_ms: Some(duration_ms),
            error_code: None,
            error_message: None,
        }
    }

    /// Outcome of a failure with a taxonomy code.
    pub fn failure(
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        duration_ms: Option<i64>,
        retry_count: i64,
    ) -> Self {
        Self {
            retry_count,
            duration_ms,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }
}
