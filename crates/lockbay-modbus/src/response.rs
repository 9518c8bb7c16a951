//! Response decoding and slave-side encoding.
//!
//! [`parse_response`] validates a received frame end to end: checksum,
//! slave address, exception marker, then the function-specific payload.
//! The caller states which slave and function it is waiting on, so a
//! reply from the wrong card or a stale reply to an earlier request is
//! rejected instead of silently accepted.
//!
//! The `*_response` encoders build the slave side of a transaction.

use bytes::{BufMut, Bytes, BytesMut};
use lockbay_core::SlaveAddress;

use crate::crc::{append_crc, verify_crc};
use crate::error::{ModbusError, ModbusResult};
use crate::exception::ExceptionCode;
use crate::frame::{COIL_OFF, COIL_ON, EXCEPTION_FRAME_LEN, FunctionCode};

/// Decoded payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Read-coils reply. Holds every bit of the data bytes, so the
    /// vector length is a multiple of eight; the caller truncates to
    /// the quantity it asked for.
    Coils(Vec<bool>),
    /// Read-holding-registers reply.
    Registers(Vec<u16>),
    /// Echo of a write-single-coil request.
    CoilWrite { offset: u16, on: bool },
    /// Echo of a write-single-register request.
    RegisterWrite { register: u16, value: u16 },
    /// Acknowledgement of a write-multiple-coils request.
    MultipleCoilsAck { start: u16, quantity: u16 },
}

/// Decode and validate a response frame.
///
/// # Errors
///
/// Returns [`ModbusError::Exception`] when the slave rejected the
/// request, and a framing error when the reply is truncated, fails the
/// checksum, or does not belong to the given slave and function.
pub fn parse_response(
    slave: SlaveAddress,
    function: FunctionCode,
    frame: &[u8],
) -> ModbusResult<Response> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        return Err(ModbusError::FrameTooShort { len: frame.len() });
    }
    let body = verify_crc(frame)?;

    if body[0] != slave.as_u8() {
        return Err(ModbusError::SlaveMismatch {
            expected: slave.as_u8(),
            actual: body[0],
        });
    }
    if body[1] == function.exception_marker() {
        return Err(ModbusError::Exception(ExceptionCode::from_u8(body[2])));
    }
    if body[1] != function.as_u8() {
        return Err(ModbusError::UnexpectedFunction {
            expected: function.as_u8(),
            actual: body[1],
        });
    }

    let data = &body[2..];
    match function {
        FunctionCode::ReadCoils => {
            let byte_count = usize::from(*data.first().ok_or_else(|| {
                ModbusError::Malformed("missing coil byte count".to_string())
            })?);
            let bits = &data[1..];
            if bits.len() != byte_count {
                return Err(ModbusError::Malformed(format!(
                    "coil byte count {byte_count} does not match {} data bytes",
                    bits.len()
                )));
            }
            let mut states = Vec::with_capacity(byte_count * 8);
            for byte in bits {
                for bit in 0..8 {
                    states.push(byte >> bit & 1 == 1);
                }
            }
            Ok(Response::Coils(states))
        }
        FunctionCode::ReadHoldingRegisters => {
            let byte_count = usize::from(*data.first().ok_or_else(|| {
                ModbusError::Malformed("missing register byte count".to_string())
            })?);
            let words = &data[1..];
            if words.len() != byte_count || byte_count % 2 != 0 {
                return Err(ModbusError::Malformed(format!(
                    "register byte count {byte_count} does not match {} data bytes",
                    words.len()
                )));
            }
            let values = words
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(Response::Registers(values))
        }
        FunctionCode::WriteSingleCoil => {
            let (offset, value) = parse_word_pair(data)?;
            let on = match value {
                COIL_ON => true,
                COIL_OFF => false,
                other => {
                    return Err(ModbusError::Malformed(format!(
                        "invalid coil value 0x{other:04X}"
                    )));
                }
            };
            Ok(Response::CoilWrite { offset, on })
        }
        FunctionCode::WriteSingleRegister => {
            let (register, value) = parse_word_pair(data)?;
            Ok(Response::RegisterWrite { register, value })
        }
        FunctionCode::WriteMultipleCoils => {
            let (start, quantity) = parse_word_pair(data)?;
            Ok(Response::MultipleCoilsAck { start, quantity })
        }
    }
}

fn parse_word_pair(data: &[u8]) -> ModbusResult<(u16, u16)> {
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

/// Encode a read-coils response carrying the given states.
pub fn coils_response(slave: SlaveAddress, states: &[bool]) -> Bytes {
    let byte_count = states.len().div_ceil(8);
    let mut frame = BytesMut::with_capacity(5 + byte_count);
    frame.put_u8(slave.as_u8());
    frame.put_u8(FunctionCode::ReadCoils.as_u8());
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
    frame.freeze()
}

/// Encode a read-holding-registers response carrying the given values.
pub fn registers_response(slave: SlaveAddress, values: &[u16]) -> Bytes {
    let mut frame = BytesMut::with_capacity(5 + values.len() * 2);
    frame.put_u8(slave.as_u8());
    frame.put_u8(FunctionCode::ReadHoldingRegisters.as_u8());
    frame.put_u8((values.len() * 2) as u8);
    for value in values {
        frame.put_u16(*value);
    }
    append_crc(&mut frame);
    frame.freeze()
}

/// Encode the acknowledgement of a write-multiple-coils request.
pub fn multiple_coils_ack(slave: SlaveAddress, start: u16, quantity: u16) -> Bytes {
    let mut frame = BytesMut::with_capacity(8);
    frame.put_u8(slave.as_u8());
    frame.put_u8(FunctionCode::WriteMultipleCoils.as_u8());
    frame.put_u16(start);
    frame.put_u16(quantity);
    append_crc(&mut frame);
    frame.freeze()
}

/// Encode an exception response for the given function.
pub fn exception_response(
    slave: SlaveAddress,
    function: FunctionCode,
    code: ExceptionCode,
) -> Bytes {
    let mut frame = BytesMut::with_capacity(EXCEPTION_FRAME_LEN);
    frame.put_u8(slave.as_u8());
    frame.put_u8(function.exception_marker());
    frame.put_u8(code.as_u8());
    append_crc(&mut frame);
    frame.freeze()
}
