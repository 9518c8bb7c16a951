//! Master-side request encoding and slave-side request decoding.
//!
//! Each builder produces a complete wire frame, CRC included, ready to
//! hand to the serial transport. Coil and register addresses are
//! zero-based wire addresses. [`parse_request`] is the inverse, used by
//! the board emulator to decode what a master asked for.

use bytes::{BufMut, Bytes, BytesMut};
use lockbay_core::SlaveAddress;

use crate::crc::{append_crc, verify_crc};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{
    COIL_OFF, COIL_ON, FunctionCode, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
};

fn frame_header(slave: SlaveAddress, function: FunctionCode, capacity: usize) -> BytesMut {
    let mut frame = BytesMut::with_capacity(capacity);
    frame.put_u8(slave.as_u8());
    frame.put_u8(function.as_u8());
    frame
}

/// Encode a read-coils request (function 0x01).
pub fn read_coils(slave: SlaveAddress, start: u16, quantity: u16) -> ModbusResult<Bytes> {
    if quantity == 0 || quantity > MAX_READ_COILS {
        return Err(ModbusError::InvalidRequest(format!(
            "coil quantity {quantity} out of range 1-{MAX_READ_COILS}"
        )));
    }
    let mut frame = frame_header(slave, FunctionCode::ReadCoils, 8);
    frame.put_u16(start);
    frame.put_u16(quantity);
    append_crc(&mut frame);
    Ok(frame.freeze())
}

/// Encode a read-holding-registers request (function 0x03).
pub fn read_holding_registers(
    slave: SlaveAddress,
    start: u16,
    quantity: u16,
) -> ModbusResult<Bytes> {
    if quantity == 0 || quantity > MAX_READ_REGISTERS {
        return Err(ModbusError::InvalidRequest(format!(
            "register quantity {quantity} out of range 1-{MAX_READ_REGISTERS}"
        )));
    }
    let mut frame = frame_header(slave, FunctionCode::ReadHoldingRegisters, 8);
    frame.put_u16(start);
    frame.put_u16(quantity);
    append_crc(&mut frame);
    Ok(frame.freeze())
}

/// Encode a write-single-coil request (function 0x05).
pub fn write_single_coil(slave: SlaveAddress, offset: u16, on: bool) -> Bytes {
    let mut frame = frame_header(slave, FunctionCode::WriteSingleCoil, 8);
    frame.put_u16(offset);
    frame.put_u16(if on { COIL_ON } else { COIL_OFF });
    append_crc(&mut frame);
    frame.freeze()
}

/// Encode a write-single-register request (function 0x06).
pub fn write_single_register(slave: SlaveAddress, register: u16, value: u16) -> Bytes {
    let mut frame = frame_header(slave, FunctionCode::WriteSingleRegister, 8);
    frame.put_u16(register);
    frame.put_u16(value);
    append_crc(&mut frame);
    frame.freeze()
}

/// Encode a write-multiple-coils request (function 0x0F).
///
/// Coil states are packed eight per byte, first coil in the lowest bit
/// of the first data byte. Unused bits of the last byte are zero.
pub fn write_multiple_coils(
    slave: SlaveAddress,
    start: u16,
    states: &[bool],
) -> ModbusResult<Bytes> {
    if states.is_empty() || states.len() > MAX_WRITE_COILS as usize {
        return Err(ModbusError::InvalidRequest(format!(
            "coil count {} out of range 1-{MAX_WRITE_COILS}",
            states.len()
        )));
    }
    let byte_count = states.len().div_ceil(8);
    let mut frame = frame_header(slave, FunctionCode::WriteMultipleCoils, 9 + byte_count);
    frame.put_u16(start);
    frame.put_u16(states.len() as u16);
    frame.put_u8(byte_count as u8);
    for chunk in states.chunks(8) {
        let mut byte = 0u8;
        for (bit, &on) in chunk.iter().enumerate() {
            if on {
                byte |= 1 << bit;
            }
        }
        frame.put_u8(byte);
    }
    append_crc(&mut frame);
    Ok(frame.freeze())
}

/// Decoded master request, as a relay card sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { start: u16, quantity: u16 },
    ReadHoldingRegisters { start: u16, quantity: u16 },
    WriteSingleCoil { offset: u16, on: bool },
    WriteSingleRegister { register: u16, value: u16 },
    WriteMultipleCoils { start: u16, states: Vec<bool> },
}

impl Request {
    #[must_use]
    pub fn function(&self) -> FunctionCode {
        match self {
            Request::ReadCoils { .. } => FunctionCode::ReadCoils,
            Request::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Request::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Request::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
        }
    }
}

/// Decode a master request frame into the addressed slave and request.
///
/// The address comes back raw: a device compares it against its own and
/// stays silent on frames meant for another card, so an address outside
/// the assignable range is not a parse error.
///
/// # Errors
///
/// Returns a framing error when the frame is truncated or fails the
/// checksum, [`ModbusError::UnknownFunction`] for a function code this
/// stack does not speak, and [`ModbusError::Malformed`] when the payload
/// does not match the function.
pub fn parse_request(frame: &[u8]) -> ModbusResult<(u8, Request)> {
    if frame.len() < 8 {
        return Err(ModbusError::FrameTooShort { len: frame.len() });
    }
    let body = verify_crc(frame)?;
    let slave = body[0];
    let function =
        FunctionCode::from_u8(body[1]).ok_or(ModbusError::UnknownFunction { function: body[1] })?;

    let data = &body[2..];
    let request = match function {
        FunctionCode::ReadCoils => {
            let (start, quantity) = word_pair(data)?;
            if quantity == 0 || quantity > MAX_READ_COILS {
                return Err(ModbusError::Malformed(format!(
                    "coil quantity {quantity} out of range 1-{MAX_READ_COILS}"
                )));
            }
            Request::ReadCoils { start, quantity }
        }
        FunctionCode::ReadHoldingRegisters => {
            let (start, quantity) = word_pair(data)?;
            if quantity == 0 || quantity > MAX_READ_REGISTERS {
                return Err(ModbusError::Malformed(format!(
                    "register quantity {quantity} out of range 1-{MAX_READ_REGISTERS}"
                )));
            }
            Request::ReadHoldingRegisters { start, quantity }
        }
        FunctionCode::WriteSingleCoil => {
            let (offset, value) = word_pair(data)?;
            let on = match value {
                COIL_ON => true,
                COIL_OFF => false,
                other => {
                    return Err(ModbusError::Malformed(format!(
                        "invalid coil value 0x{other:04X}"
                    )));
                }
            };
            Request::WriteSingleCoil { offset, on }
        }
        FunctionCode::WriteSingleRegister => {
            let (register, value) = word_pair(data)?;
            Request::WriteSingleRegister { register, value }
        }
        FunctionCode::WriteMultipleCoils => {
            if data.len() < 5 {
                return Err(ModbusError::Malformed(format!(
                    "write-multiple-coils payload of {} bytes",
                    data.len()
                )));
            }
            let start = u16::from_be_bytes([data[0], data[1]]);
            let quantity = u16::from_be_bytes([data[2], data[3]]);
            let byte_count = usize::from(data[4]);
            let bits = &data[5..];
            if quantity == 0 || quantity > MAX_WRITE_COILS {
                return Err(ModbusError::Malformed(format!(
                    "coil quantity {quantity} out of range 1-{MAX_WRITE_COILS}"
                )));
            }
            if bits.len() != byte_count || byte_count != (quantity as usize).div_ceil(8) {
                return Err(ModbusError::Malformed(format!(
                    "byte count {byte_count} does not cover {quantity} coils"
                )));
            }
            let states = (0..quantity as usize)
                .map(|index| bits[index / 8] >> (index % 8) & 1 == 1)
                .collect();
            Request::WriteMultipleCoils { start, states }
        }
    };

    Ok((slave, request))
}

fn word_pair(data: &[u8]) -> ModbusResult<(u16, u16)> {
    if data.len() != 4 {
        return Err(ModbusError::Malformed(format!(
            "expected 4 data bytes, got {}",
            data.len()
        )));
    }
    Ok((
        u16::from_be_bytes([data[0], data[1]]),
        u16::from_be_bytes([data[2], data[3]]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    #[test]
    fn test_write_single_coil_on() {
        let frame = write_single_coil(slave(1), 0, true);
        assert_eq!(&frame[..], &[0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]);
    }

    #[test]
    fn test_write_single_coil_off() {
        let frame = write_single_coil(slave(1), 0, false);
        assert_eq!(&frame[..], &[0x01, 0x05, 0x00, 0x00, 0x00, 0x00, 0xCD, 0xCA]);
    }

    #[test]
    fn test_read_coils_frame() {
        let frame = read_coils(slave(1), 0, 8).unwrap();
        assert_eq!(&frame[..], &[0x01, 0x01, 0x00, 0x00, 0x00, 0x08, 0x3D, 0xCC]);
    }

    #[test]
    fn test_read_coils_rejects_zero_quantity() {
        let err = read_coils(slave(1), 0, 0).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidRequest(_)));
    }

    #[test]
    fn test_read_coils_rejects_oversized_quantity() {
        assert!(read_coils(slave(1), 0, MAX_READ_COILS).is_ok());
        assert!(read_coils(slave(1), 0, MAX_READ_COILS + 1).is_err());
    }

    #[test]
    fn test_read_holding_registers_frame() {
        let frame = read_holding_registers(slave(3), 0x4000, 1).unwrap();
        assert_eq!(frame[0], 0x03);
        assert_eq!(frame[1], 0x03);
        assert_eq!(&frame[2..4], &[0x40, 0x00]);
        assert_eq!(&frame[4..6], &[0x00, 0x01]);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn test_write_single_register_frame() {
        let frame = write_single_register(slave(1), 0x4000, 0x0005);
        assert_eq!(&frame[..6], &[0x01, 0x06, 0x40, 0x00, 0x00, 0x05]);
        assert_eq!(frame.len(), 8);
    }

    #[test]
    fn test_write_multiple_coils_packs_lsb_first() {
        let frame = write_multiple_coils(slave(1), 0, &[true, false, true]).unwrap();
        assert_eq!(frame[1], 0x0F);
        assert_eq!(&frame[2..4], &[0x00, 0x00]);
        assert_eq!(&frame[4..6], &[0x00, 0x03]);
        assert_eq!(frame[6], 1); // byte count
        assert_eq!(frame[7], 0b0000_0101);
        assert_eq!(frame.len(), 10);
    }

    #[test]
    fn test_write_multiple_coils_sixteen_channels() {
        let frame = write_multiple_coils(slave(2), 0, &[false; 16]).unwrap();
        assert_eq!(frame[6], 2);
        assert_eq!(&frame[7..9], &[0x00, 0x00]);
        assert_eq!(frame.len(), 11);
    }

    #[test]
    fn test_write_multiple_coils_rejects_empty() {
        let err = write_multiple_coils(slave(1), 0, &[]).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_request_single_coil() {
        let frame = write_single_coil(slave(7), 4, true);
        let (addr, request) = parse_request(&frame).unwrap();
        assert_eq!(addr, 7);
        assert_eq!(request, Request::WriteSingleCoil { offset: 4, on: true });
        assert_eq!(request.function(), FunctionCode::WriteSingleCoil);
    }

    #[test]
    fn test_parse_request_multiple_coils_truncates_padding() {
        let frame = write_multiple_coils(slave(1), 2, &[true, false, true]).unwrap();
        let (_, request) = parse_request(&frame).unwrap();
        // Only the requested quantity comes back, not the padded byte.
        assert_eq!(
            request,
            Request::WriteMultipleCoils {
                start: 2,
                states: vec![true, false, true]
            }
        );
    }

    #[test]
    fn test_parse_request_read_coils() {
        let frame = read_coils(slave(3), 0, 16).unwrap();
        let (addr, request) = parse_request(&frame).unwrap();
        assert_eq!(addr, 3);
        assert_eq!(request, Request::ReadCoils { start: 0, quantity: 16 });
    }

    #[test]
    fn test_parse_request_register_write() {
        let frame = write_single_register(slave(1), 0x4000, 9);
        let (_, request) = parse_request(&frame).unwrap();
        assert_eq!(
            request,
            Request::WriteSingleRegister {
                register: 0x4000,
                value: 9
            }
        );
    }

    #[test]
    fn test_parse_request_rejects_unknown_function() {
        let mut frame = BytesMut::new();
        frame.put_u8(0x01);
        frame.put_u8(0x2B); // not in the supported set
        frame.put_u16(0);
        frame.put_u16(0);
        append_crc(&mut frame);
        let err = parse_request(&frame).unwrap_err();
        assert_eq!(err, ModbusError::UnknownFunction { function: 0x2B });
    }

    #[test]
    fn test_parse_request_rejects_corrupt_crc() {
        let mut frame = write_single_coil(slave(1), 0, true).to_vec();
        frame[2] ^= 0x40;
        let err = parse_request(&frame).unwrap_err();
        assert!(matches!(err, ModbusError::CrcMismatch { .. }));
    }

    #[test]
    fn test_parse_request_rejects_bad_coil_value() {
        let mut frame = BytesMut::new();
        frame.put_u8(0x01);
        frame.put_u8(0x05);
        frame.put_u16(0x0000);
        frame.put_u16(0x00FF); // neither ON nor OFF
        append_crc(&mut frame);
        let err = parse_request(&frame).unwrap_err();
        assert!(matches!(err, ModbusError::Malformed(_)));
    }
}
