//! Error types for relay bus operations.
//!
//! These cover everything between the serial device node and a decoded
//! reply. Each variant maps onto a [`HardwareKind`], which is what gets
//! persisted as the error code of a failed command.

use lockbay_core::HardwareKind;
use lockbay_modbus::{ExceptionCode, ModbusError};

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while driving the relay bus.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The serial port could not be opened or is held by another process.
    #[error("Port unavailable: {port}: {message}")]
    PortUnavailable { port: String, message: String },

    /// The slave did not answer before the response deadline.
    #[error("No response from slave {slave} after {duration_ms}ms")]
    ResponseTimeout { slave: u8, duration_ms: u64 },

    /// The link dropped mid-session.
    #[error("Link lost: {message}")]
    LinkLost { message: String },

    /// The slave answered with a malformed or rejected frame.
    #[error("Protocol error from slave {slave}: {source}")]
    Protocol {
        slave: u8,
        #[source]
        source: ModbusError,
    },

    /// A read-back disagreed with the state that was just written.
    #[error("Coil {coil} on slave {slave} did not reach the commanded state")]
    VerificationFailed { slave: u8, coil: u16 },

    /// The locker does not map onto any configured relay channel.
    #[error("No relay channel for locker {locker}: {message}")]
    Unmapped { locker: u16, message: String },

    /// Generic I/O error on the serial device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new port unavailable error.
    pub fn port_unavailable(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortUnavailable {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new response timeout error.
    pub fn timeout(slave: u8, duration_ms: u64) -> Self {
        Self::ResponseTimeout { slave, duration_ms }
    }

    /// Create a new link lost error.
    pub fn link_lost(message: impl Into<String>) -> Self {
        Self::LinkLost {
            message: message.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol(slave: u8, source: ModbusError) -> Self {
        Self::Protocol { slave, source }
    }

    /// Create a new unmapped locker error.
    pub fn unmapped(locker: u16, message: impl Into<String>) -> Self {
        Self::Unmapped {
            locker,
            message: message.into(),
        }
    }

    /// Classification persisted as the error code of a failed command.
    pub fn kind(&self) -> HardwareKind {
        match self {
            HardwareError::PortUnavailable { .. }
            | HardwareError::LinkLost { .. }
            | HardwareError::Io(_) => HardwareKind::HardwareDisconnected,
            HardwareError::ResponseTimeout { .. } => HardwareKind::HardwareTimeout,
            HardwareError::Protocol { .. } | HardwareError::VerificationFailed { .. } => {
                HardwareKind::ProtocolError
            }
            HardwareError::Unmapped { .. } => HardwareKind::InvalidCoil,
        }
    }

    /// Whether resending the identical request may succeed.
    ///
    /// Stale replies and line noise clear on a clean retransmit; a dead
    /// port or a rejected address does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            HardwareError::ResponseTimeout { .. } | HardwareError::VerificationFailed { .. } => {
                true
            }
            HardwareError::Protocol { source, .. } => match source {
                ModbusError::Exception(code) => code.is_retryable(),
                ModbusError::CrcMismatch { .. }
                | ModbusError::FrameTooShort { .. }
                | ModbusError::SlaveMismatch { .. }
                | ModbusError::UnexpectedFunction { .. }
                | ModbusError::Malformed(_) => true,
                ModbusError::InvalidRequest(_) | ModbusError::UnknownFunction { .. } => false,
            },
            HardwareError::PortUnavailable { .. }
            | HardwareError::LinkLost { .. }
            | HardwareError::Unmapped { .. }
            | HardwareError::Io(_) => false,
        }
    }

    /// Whether the slave rejected the function code itself.
    pub fn is_illegal_function(&self) -> bool {
        matches!(
            self,
            HardwareError::Protocol {
                source: ModbusError::Exception(ExceptionCode::IllegalFunction),
                ..
            }
        )
    }
}

impl From<HardwareError> for lockbay_core::Error {
    fn from(err: HardwareError) -> Self {
        lockbay_core::Error::hardware(err.kind(), err.to_string())
    }
}
