//! Modbus RTU frame layout.
//!
//! Every frame on the RS-485 bus has the same envelope:
//!
//! ```text
//! +-------+----------+----------------+---------+
//! | slave | function |      data      | CRC-16  |
//! | 1B    | 1B       | 0..252 bytes   | 2B (LE) |
//! +-------+----------+----------------+---------+
//! ```
//!
//! - `slave`: bus address 1-247 (0 is broadcast and never used here)
//! - `function`: one of [`FunctionCode`]
//! - `data`: function-specific payload, big-endian multi-byte fields
//! - `CRC-16`: CRC-16/MODBUS over slave+function+data, low byte first
//!
//! There is no length field and no frame delimiter. RTU framing relies
//! on bus silence between frames, so a master must know the expected
//! response length up front (see [`expected_response_len`]) and treat
//! a short read as a timeout or an exception response.
//!
//! # Exception responses
//!
//! When a slave rejects a request it echoes the function code with the
//! high bit set, followed by a single exception code byte:
//!
//! ```text
//! +-------+-----------------+------+---------+
//! | slave | function | 0x80 | code | CRC-16  |
//! +-------+-----------------+------+---------+
//! ```
//!
//! # Coil and register addressing
//!
//! Addresses on the wire are zero-based. Relay channel 1 of a card is
//! coil address 0. Coil values in a write-single-coil request are
//! `0xFF00` for ON and `0x0000` for OFF; any other value is rejected by
//! the cards.

use std::fmt;

/// Coil value for ON in a write-single-coil frame.
pub const COIL_ON: u16 = 0xFF00;

/// Coil value for OFF in a write-single-coil frame.
pub const COIL_OFF: u16 = 0x0000;

/// Holding register that stores the card's bus address.
///
/// Reading it returns the current address; writing it re-addresses the
/// card. Takes effect immediately, so the next request must use the new
/// address.
pub const SLAVE_ID_REGISTER: u16 = 0x4000;

/// Length of an exception response frame.
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Largest frame the protocol allows.
pub const MAX_FRAME_LEN: usize = 256;

/// Factory default baud rate of the relay cards (8N1 framing).
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Most coils a single read request may cover.
pub const MAX_READ_COILS: u16 = 2000;

/// Most registers a single read request may cover.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Most coils a single multiple-write request may cover.
pub const MAX_WRITE_COILS: u16 = 1968;

/// Function codes used by the relay cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 0x01 - read coil states.
    ReadCoils,
    /// 0x03 - read holding registers.
    ReadHoldingRegisters,
    /// 0x05 - write a single coil.
    WriteSingleCoil,
    /// 0x06 - write a single holding register.
    WriteSingleRegister,
    /// 0x0F - write a contiguous run of coils.
    WriteMultipleCoils,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FunctionCode::ReadCoils),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
        }
    }

    /// The function byte a slave sends when rejecting this request.
    pub fn exception_marker(&self) -> u8 {
        self.as_u8() | 0x80
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "read coils",
            FunctionCode::ReadHoldingRegisters => "read holding registers",
            FunctionCode::WriteSingleCoil => "write single coil",
            FunctionCode::WriteSingleRegister => "write single register",
            FunctionCode::WriteMultipleCoils => "write multiple coils",
        };
        write!(f, "{} (0x{:02X})", name, self.as_u8())
    }
}

/// Expected length of a successful response, CRC included.
///
/// `quantity` is the coil or register count of the request; it is
/// ignored for the write functions, whose responses have a fixed
/// length.
///
/// # Examples
///
/// ```
/// use lockbay_modbus::frame::{FunctionCode, expected_response_len};
///
/// // 16 coils pack into 2 data bytes.
/// assert_eq!(expected_response_len(FunctionCode::ReadCoils, 16), 7);
/// // Write echoes are always 8 bytes.
/// assert_eq!(expected_response_len(FunctionCode::WriteSingleCoil, 1), 8);
/// ```
pub fn expected_response_len(function: FunctionCode, quantity: u16) -> usize {
    match function {
        FunctionCode::ReadCoils => 5 + (quantity as usize).div_ceil(8),
        FunctionCode::ReadHoldingRegisters => 5 + 2 * quantity as usize,
        FunctionCode::WriteSingleCoil
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleCoils => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x01, FunctionCode::ReadCoils)]
    #[case(0x03, FunctionCode::ReadHoldingRegisters)]
    #[case(0x05, FunctionCode::WriteSingleCoil)]
    #[case(0x06, FunctionCode::WriteSingleRegister)]
    #[case(0x0F, FunctionCode::WriteMultipleCoils)]
    fn test_function_code_roundtrip(#[case] raw: u8, #[case] code: FunctionCode) {
        assert_eq!(FunctionCode::from_u8(raw), Some(code));
        assert_eq!(code.as_u8(), raw);
    }

    #[test]
    fn test_unknown_function_code() {
        assert_eq!(FunctionCode::from_u8(0x10), None);
        assert_eq!(FunctionCode::from_u8(0x85), None);
    }

    #[test]
    fn test_exception_marker_sets_high_bit() {
        assert_eq!(FunctionCode::WriteSingleCoil.exception_marker(), 0x85);
        assert_eq!(FunctionCode::WriteMultipleCoils.exception_marker(), 0x8F);
    }

    #[rstest]
    #[case(FunctionCode::ReadCoils, 1, 6)]
    #[case(FunctionCode::ReadCoils, 8, 6)]
    #[case(FunctionCode::ReadCoils, 9, 7)]
    #[case(FunctionCode::ReadCoils, 16, 7)]
    #[case(FunctionCode::ReadHoldingRegisters, 1, 7)]
    #[case(FunctionCode::ReadHoldingRegisters, 2, 9)]
    #[case(FunctionCode::WriteSingleCoil, 1, 8)]
    #[case(FunctionCode::WriteSingleRegister, 1, 8)]
    #[case(FunctionCode::WriteMultipleCoils, 16, 8)]
    fn test_expected_response_len(
        #[case] function: FunctionCode,
        #[case] quantity: u16,
        #[case] expected: usize,
    ) {
        assert_eq!(expected_response_len(function, quantity), expected);
    }
}
