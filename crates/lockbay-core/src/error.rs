use thiserror::Error;
use uuid::Uuid;

use crate::state::{LockerEvent, LockerState};

/// Classification of a hardware failure.
///
/// Carried inside [`Error::Hardware`] and persisted as the `error_code`
/// of a failed command, so issuers can distinguish a dead bus from a bad
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardwareKind {
    /// The slave did not answer within the response timeout.
    HardwareTimeout,
    /// The serial bus could not be opened or dropped mid-session.
    HardwareDisconnected,
    /// Malformed frame, CRC mismatch, or a Modbus exception reply.
    ProtocolError,
    /// The locker maps outside the configured relay hardware.
    InvalidCoil,
}

impl HardwareKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareKind::HardwareTimeout => "HARDWARE_TIMEOUT",
            HardwareKind::HardwareDisconnected => "HARDWARE_DISCONNECTED",
            HardwareKind::ProtocolError => "PROTOCOL_ERROR",
            HardwareKind::InvalidCoil => "INVALID_COIL",
        }
    }
}

impl std::fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HardwareKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HARDWARE_TIMEOUT" => Ok(HardwareKind::HardwareTimeout),
            "HARDWARE_DISCONNECTED" => Ok(HardwareKind::HardwareDisconnected),
            "PROTOCOL_ERROR" => Ok(HardwareKind::ProtocolError),
            "INVALID_COIL" => Ok(HardwareKind::InvalidCoil),
            _ => Err(Error::Validation(format!("Unknown hardware kind: {s}"))),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Validation errors - rejected before any state changes, never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    // Queue conflicts - an equivalent command is already outstanding
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        existing_id: Option<Uuid>,
    },

    // Optimistic concurrency - caller must re-read and retry
    #[error("Stale version for locker {locker_id}: expected {expected}")]
    StaleVersion { locker_id: u16, expected: i64 },

    #[error("Illegal transition: {event} while {from}")]
    InvalidTransition {
        from: LockerState,
        event: LockerEvent,
    },

    // Hardware failures - retried locally, then surfaced on the command
    #[error("{kind}: {message}")]
    Hardware { kind: HardwareKind, message: String },

    // Zone configuration - change rejected, prior configuration retained
    #[error("Zone configuration rejected: {0}")]
    ZoneConfig(String),

    // Lookup failures
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
            existing_id: None,
        }
    }

    pub fn conflict_with(message: impl Into<String>, existing_id: Uuid) -> Self {
        Error::Conflict {
            message: message.into(),
            existing_id: Some(existing_id),
        }
    }

    pub fn hardware(kind: HardwareKind, message: impl Into<String>) -> Self {
        Error::Hardware {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Hardware kind when this is a hardware failure.
    #[must_use]
    pub fn hardware_kind(&self) -> Option<HardwareKind> {
        match self {
            Error::Hardware { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
