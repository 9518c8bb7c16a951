use thiserror::Error;

use crate::exception::ExceptionCode;

/// Errors produced while encoding requests or decoding responses.
///
/// These cover the wire level only. Transport failures (timeouts, a
/// disconnected adapter) are reported by the layer that owns the serial
/// port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("CRC mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    CrcMismatch { computed: u16, received: u16 },

    #[error("response from slave {actual}, expected slave {expected}")]
    SlaveMismatch { expected: u8, actual: u8 },

    #[error("response function 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("function code 0x{function:02X} is not supported")]
    UnknownFunction { function: u8 },

    #[error("slave exception: {0}")]
    Exception(ExceptionCode),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed frame: {0}")]
    Malformed(String),
}

pub type ModbusResult<T> = std::result::Result<T, ModbusError>;
