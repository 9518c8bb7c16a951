use std::fmt;

/// Exception codes returned by a slave in an exception response.
///
/// An exception response carries the request function code with the
/// high bit set, followed by one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01 - function code not supported by the slave.
    IllegalFunction,
    /// 0x02 - data address outside the slave's range.
    IllegalDataAddress,
    /// 0x03 - value in the data field not allowed.
    IllegalDataValue,
    /// 0x04 - unrecoverable error while servicing the request.
    SlaveDeviceFailure,
    /// 0x05 - request accepted, long-running processing started.
    Acknowledge,
    /// 0x06 - slave busy with a long-running command.
    SlaveDeviceBusy,
    /// 0x08 - parity error in extended memory.
    MemoryParityError,
    /// 0x0A - gateway could not allocate an internal path.
    GatewayPathUnavailable,
    /// 0x0B - no response from the gateway target.
    GatewayTargetFailed,
    /// Any code outside the standard table.
    Other(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailed,
            other => ExceptionCode::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailed => 0x0B,
            ExceptionCode::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::SlaveDeviceFailure => "slave device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::SlaveDeviceBusy => "slave device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailed => "gateway target failed to respond",
            ExceptionCode::Other(_) => "unrecognized exception",
        }
    }

    /// Whether the slave may succeed if the exact same request is sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExceptionCode::Acknowledge | ExceptionCode::SlaveDeviceBusy
        )
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code 0x{:02X})", self.description(), self.as_u8())
    }
}
