//! Command model: the intents issuers enqueue against a kiosk.
//!
//! A command is immutable once created; only its lifecycle status moves
//! (`pending -> executing -> completed | failed`). The payload is a tagged
//! union so the execution site matches exhaustively - adding a command
//! type without handling it everywhere does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::{MAX_BULK_LOCKERS, MAX_BUZZER_BEEPS, MAX_PULSE_HOLD_MS, MIN_PULSE_HOLD_MS};
use crate::error::{Error, Result};
use crate::types::LockerId;

/// Command identifier (UUID v4, assigned at enqueue).
pub type CommandId = Uuid;

/// Lifecycle status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

    /// Terminal commands are immutable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "executing" => Ok(CommandStatus::Executing),
            "completed" => Ok(CommandStatus::Completed),
            "failed" => Ok(CommandStatus::Failed),
            _ => Err(Error::Validation(format!("Unknown command status: {s}"))),
        }
    }
}

/// Discriminant of a command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Open,
    BulkOpen,
    Block,
    Unblock,
    Reset,
    Buzzer,
}

impl CommandKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Open => "open",
            CommandKind::BulkOpen => "bulk_open",
            CommandKind::Block => "block",
            CommandKind::Unblock => "unblock",
            CommandKind::Reset => "reset",
            CommandKind::Buzzer => "buzzer",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(CommandKind::Open),
            "bulk_open" => Ok(CommandKind::BulkOpen),
            "block" => Ok(CommandKind::Block),
            "unblock" => Ok(CommandKind::Unblock),
            "reset" => Ok(CommandKind::Reset),
            "buzzer" => Ok(CommandKind::Buzzer),
            _ => Err(Error::Validation(format!("Unknown command type: {s}"))),
        }
    }
}

/// Tagged command payload, one variant per [`CommandKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    /// Pulse one locker open. `burst` requests maintenance burst mode
    /// (repeated pulses against a stuck mechanism).
    Open {
        locker_id: LockerId,
        #[serde(default)]
        burst: bool,
    },
    /// Open several lockers sequentially, spaced by `interval_ms`
    /// (defaults to the configured bulk interval). Individual failures do
    /// not stop the remaining opens.
    BulkOpen {
        locker_ids: Vec<LockerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval_ms: Option<u64>,
    },
    /// Take a locker out of service.
    Block {
        locker_id: LockerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Return a blocked locker to service.
    Unblock { locker_id: LockerId },
    /// Clear a locker back to `Free`, dropping any owner.
    Reset { locker_id: LockerId },
    /// Sound the kiosk buzzer.
    Buzzer {
        #[serde(default = "default_beeps")]
        beeps: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

fn default_beeps() -> u8 {
    1
}

impl CommandPayload {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::Open { .. } => CommandKind::Open,
            CommandPayload::BulkOpen { .. } => CommandKind::BulkOpen,
            CommandPayload::Block { .. } => CommandKind::Block,
            CommandPayload::Unblock { .. } => CommandKind::Unblock,
            CommandPayload::Reset { .. } => CommandKind::Reset,
            CommandPayload::Buzzer { .. } => CommandKind::Buzzer,
        }
    }

    /// The single locker this command addresses, if it addresses exactly
    /// one (the `locker_id` column; bulk and buzzer store NULL).
    #[must_use]
    pub fn primary_locker(&self) -> Option<LockerId> {
        match self {
            CommandPayload::Open { locker_id, .. }
            | CommandPayload::Block { locker_id, .. }
            | CommandPayload::Unblock { locker_id }
            | CommandPayload::Reset { locker_id } => Some(*locker_id),
            CommandPayload::BulkOpen { .. } | CommandPayload::Buzzer { .. } => None,
        }
    }

    /// Every locker this command touches, bulk expansion included.
    ///
    /// This is the set registered for the per-locker mutual-exclusion
    /// check at enqueue time.
    #[must_use]
    pub fn target_lockers(&self) -> Vec<LockerId> {
        match self {
            CommandPayload::Open { locker_id, .. }
            | CommandPayload::Block { locker_id, .. }
            | CommandPayload::Unblock { locker_id }
            | CommandPayload::Reset { locker_id } => vec![*locker_id],
            CommandPayload::BulkOpen { locker_ids, .. } => locker_ids.clone(),
            CommandPayload::Buzzer { .. } => Vec::new(),
        }
    }

    /// Canonical key identifying an equivalent command.
    ///
    /// Two payloads with the same key are duplicates for the enqueue
    /// conflict check. Bulk targets are sorted so submission order does
    /// not defeat the check.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match self {
            CommandPayload::Open { locker_id, .. } => format!("open:{locker_id}"),
            CommandPayload::BulkOpen { locker_ids, .. } => {
                let mut ids: Vec<u16> = locker_ids.iter().map(LockerId::as_u16).collect();
                ids.sort_unstable();
                let joined = ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                format!("bulk_open:{joined}")
            }
            CommandPayload::Block { locker_id, .. } => format!("block:{locker_id}"),
            CommandPayload::Unblock { locker_id } => format!("unblock:{locker_id}"),
            CommandPayload::Reset { locker_id } => format!("reset:{locker_id}"),
            CommandPayload::Buzzer { .. } => "buzzer".to_string(),
        }
    }

    /// Validate payload shape before it is accepted into the queue.
    ///
    /// # Errors
    /// Returns `Error::Validation` for an empty or oversized bulk list,
    /// duplicate bulk targets, a zero beep count, or an out-of-range beep
    /// duration.
    pub fn validate(&self) -> Result<()> {
        match self {
            CommandPayload::BulkOpen { locker_ids, .. } => {
                if locker_ids.is_empty() {
                    return Err(Error::validation("bulk_open requires at least one locker"));
                }
                if locker_ids.len() > MAX_BULK_LOCKERS {
                    return Err(Error::Validation(format!(
                        "bulk_open limited to {MAX_BULK_LOCKERS} lockers, got {}",
                        locker_ids.len()
                    )));
                }
                let mut seen = locker_ids.clone();
                seen.sort_unstable();
                seen.dedup();
                if seen.len() != locker_ids.len() {
                    return Err(Error::validation("bulk_open targets must be unique"));
                }
                Ok(())
            }
            CommandPayload::Buzzer { beeps, duration_ms } => {
                if *beeps == 0 || *beeps > MAX_BUZZER_BEEPS {
                    return Err(Error::Validation(format!(
                        "Buzzer beeps must be 1-{MAX_BUZZER_BEEPS}, got {beeps}"
                    )));
                }
                if let Some(ms) = duration_ms
                    && !(MIN_PULSE_HOLD_MS..=MAX_PULSE_HOLD_MS).contains(ms)
                {
                    return Err(Error::Validation(format!(
                        "Buzzer duration must be {MIN_PULSE_HOLD_MS}-{MAX_PULSE_HOLD_MS} ms, got {ms}"
                    )));
                }
                Ok(())
            }
            CommandPayload::Block { reason, .. } => {
                if let Some(reason) = reason
                    && reason.len() > 200
                {
                    return Err(Error::validation("Block reason limited to 200 chars"));
                }
                Ok(())
            }
            CommandPayload::Open { .. }
            | CommandPayload::Unblock { .. }
            | CommandPayload::Reset { .. } => Ok(()),
        }
    }
}
