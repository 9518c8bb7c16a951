//! CRC-16/MODBUS checksum.
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF, no final
//! XOR. The checksum is transmitted low byte first, appended after the
//! frame payload.

use bytes::{BufMut, BytesMut};

use crate::error::{ModbusError, ModbusResult};

/// Compute the CRC-16/MODBUS checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the checksum of the current frame contents, low byte first.
pub fn append_crc(frame: &mut BytesMut) {
    let crc = crc16(frame);
    frame.put_u16_le(crc);
}

/// Verify the trailing checksum of a received frame.
///
/// Returns the frame body with the two CRC bytes stripped.
///
/// # Errors
///
/// Returns [`ModbusError::FrameTooShort`] if the frame cannot hold an
/// address, a function code and a checksum, or
/// [`ModbusError::CrcMismatch`] if the trailing checksum does not match
/// the body.
pub fn verify_crc(frame: &[u8]) -> ModbusResult<&[u8]> {
    if frame.len() < 4 {
        return Err(ModbusError::FrameTooShort { len: frame.len() });
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    let computed = crc16(body);
    if computed != received {
        return Err(ModbusError::CrcMismatch { computed, received });
    }
    Ok(body)
}
