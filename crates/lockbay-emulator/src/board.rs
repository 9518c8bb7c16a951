//! Emulated relay card chain.
//!
//! [`VirtualBus`] models an entire RS-485 daisy chain of 16-channel
//! relay cards: it takes raw request frames, runs them through the same
//! decoding a real card performs, mutates per-card coil state, and
//! produces the exact reply bytes the card would put on the wire.
//!
//! The cards behave like the cheap boards they stand in for:
//!
//! - A frame with a bad checksum, a truncated frame, or a function code
//!   outside the supported set gets no reply at all.
//! - A frame addressed to a card that is not on the chain gets no reply.
//! - A decodable request that asks for something the card cannot do is
//!   answered with a Modbus exception.
//! - A single-coil write is acknowledged by echoing the request frame.
//!
//! # Fault Injection
//!
//! Failure paths are scripted through [`FaultPlan`] or the individual
//! setters: replies can be swallowed or checksum-corrupted, a card can
//! be marked as legacy firmware that rejects the multi-coil function,
//! and individual relays can be jammed so writes are acknowledged but
//! the contact never moves.
//!
//! # Examples
//!
//! ```
//! use lockbay_core::SlaveAddress;
//! use lockbay_emulator::VirtualBus;
//! use lockbay_modbus::request;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut bus = VirtualBus::builder().card(1).build()?;
//!
//! // Energize channel 4 (wire offset 3) and observe the state change.
//! let frame = request::write_single_coil(SlaveAddress::new(1)?, 3, true);
//! let reply = bus.process_frame(&frame);
//! assert!(reply.is_some());
//! assert_eq!(bus.coil(1, 4), Some(true));
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use lockbay_core::constants::COILS_PER_CARD;
use lockbay_core::{CoilAddress, Error, Result, SlaveAddress};
use lockbay_modbus::frame::SLAVE_ID_REGISTER;
use lockbay_modbus::request::{Request, parse_request, write_single_coil, write_single_register};
use lockbay_modbus::response::{
    coils_response, exception_response, multiple_coils_ack, registers_response,
};
use lockbay_modbus::{ExceptionCode, FunctionCode, ModbusError};

/// Relay channels on one emulated card.
pub const CHANNELS_PER_CARD: usize = COILS_PER_CARD as usize;

/// Scripted failures, applied on top of an otherwise healthy bus.
///
/// The plan is deserializable so a development profile can point a mock
/// link at a JSON fault script instead of recompiling tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPlan {
    /// Swallow this many replies before the bus answers again.
    #[serde(default)]
    pub drop_replies: u32,
    /// Corrupt the checksum of this many replies.
    #[serde(default)]
    pub corrupt_replies: u32,
    /// Cards whose firmware answers the multi-coil function with an
    /// illegal-function exception.
    #[serde(default)]
    pub legacy_cards: Vec<u8>,
    /// Relays that acknowledge writes without moving, as
    /// `(card address, channel)` pairs with 1-based channels.
    #[serde(default)]
    pub stuck_channels: Vec<(u8, u8)>,
}

/// One 16-channel relay card on the chain.
#[derive(Debug, Clone)]
struct Card {
    address: SlaveAddress,
    coils: [bool; CHANNELS_PER_CARD],
    rejects_multi_coil: bool,
    stuck: [bool; CHANNELS_PER_CARD],
}

impl Card {
    fn new(address: SlaveAddress) -> Self {
        Self {
            address,
            coils: [false; CHANNELS_PER_CARD],
            rejects_multi_coil: false,
            stuck: [false; CHANNELS_PER_CARD],
        }
    }

    /// Apply a write, unless the relay at this offset is jammed.
    fn write_coil(&mut self, offset: usize, on: bool) {
        if !self.stuck[offset] {
            self.coils[offset] = on;
        }
    }
}

/// An in-process RS-485 chain of relay cards.
#[derive(Debug, Clone, Default)]
pub struct VirtualBus {
    cards: Vec<Card>,
    drop_replies: u32,
    corrupt_replies: u32,
    frames_received: u64,
}

impl VirtualBus {
    /// An empty chain with no cards installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a chain card by card.
    #[must_use]
    pub fn builder() -> VirtualBusBuilder {
        VirtualBusBuilder::new()
    }

    /// Put a card on the chain at the given bus address.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the address is outside the
    /// assignable range or already taken by another card.
    pub fn install_card(&mut self, address: u8) -> Result<()> {
        let address = SlaveAddress::new(address)?;
        if self.card_index(address.as_u8()).is_some() {
            return Err(Error::validation(format!(
                "duplicate relay card address {}",
                address.as_u8()
            )));
        }
        self.cards.push(Card::new(address));
        Ok(())
    }

    /// Bus addresses of the installed cards, in installation order.
    #[must_use]
    pub fn card_addresses(&self) -> Vec<u8> {
        self.cards.iter().map(|card| card.address.as_u8()).collect()
    }

    /// Total frames seen, including dropped and ignored ones.
    ///
    /// Retry behavior shows up here: a write that timed out twice and
    /// landed on the third attempt counts three frames.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// State of one relay, by card address and 1-based channel number.
    ///
    /// Returns `None` for an unknown card or channel.
    #[must_use]
    pub fn coil(&self, address: u8, channel: u8) -> Option<bool> {
        let index = self.card_index(address)?;
        let offset = usize::from(channel.checked_sub(1)?);
        self.cards[index].coils.get(offset).copied()
    }

    /// Force a relay into a state without going through the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the card or channel does not exist.
    pub fn set_coil(&mut self, address: u8, channel: u8, on: bool) -> Result<()> {
        let channel = CoilAddress::new(channel)?;
        let index = self.find_card(address)?;
        self.cards[index].coils[usize::from(channel.wire_offset())] = on;
        Ok(())
    }

    /// Swallow the next `count` replies, stacking with earlier calls.
    pub fn drop_next_replies(&mut self, count: u32) {
        self.drop_replies = self.drop_replies.saturating_add(count);
    }

    /// Corrupt the checksum of the next `count` replies.
    pub fn corrupt_next_replies(&mut self, count: u32) {
        self.corrupt_replies = self.corrupt_replies.saturating_add(count);
    }

    /// Mark a card as legacy firmware that rejects multi-coil writes.
    ///
    /// # Errors
    ///
    /// Returns an error if no card sits at the given address.
    pub fn mark_legacy(&mut self, address: u8) -> Result<()> {
        let index = self.find_card(address)?;
        self.cards[index].rejects_multi_coil = true;
        Ok(())
    }

    /// Jam one relay so writes are acknowledged but the state holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the card or channel does not exist.
    pub fn stick_channel(&mut self, address: u8, channel: u8) -> Result<()> {
        let channel = CoilAddress::new(channel)?;
        let index = self.find_card(address)?;
        self.cards[index].stuck[usize::from(channel.wire_offset())] = true;
        Ok(())
    }

    /// Apply a whole fault script at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan names a card or channel that is not
    /// on the chain.
    pub fn apply_faults(&mut self, plan: &FaultPlan) -> Result<()> {
        self.drop_next_replies(plan.drop_replies);
        self.corrupt_next_replies(plan.corrupt_replies);
        for &address in &plan.legacy_cards {
            self.mark_legacy(address)?;
        }
        for &(address, channel) in &plan.stuck_channels {
            self.stick_channel(address, channel)?;
        }
        Ok(())
    }

    /// Feed one request frame to the chain and collect the reply.
    ///
    /// `None` means bus silence: the frame was noise, addressed nobody,
    /// or fell to a drop fault. The caller decides what silence means;
    /// the emulated link reports it as a response timeout.
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Bytes> {
        self.frames_received += 1;

        if self.drop_replies > 0 {
            self.drop_replies -= 1;
            return None;
        }

        let reply = self.answer(frame)?;
        Some(self.maybe_corrupt(reply))
    }

    fn answer(&mut self, frame: &[u8]) -> Option<Bytes> {
        let (addressed, request) = match parse_request(frame) {
            Ok(decoded) => decoded,
            // Noise and unsupported functions get no reply, like the
            // real cards.
            Err(
                ModbusError::FrameTooShort { .. }
                | ModbusError::CrcMismatch { .. }
                | ModbusError::UnknownFunction { .. },
            ) => return None,
            // The checksum held but the payload does not fit the
            // function: the addressed card rejects the value.
            Err(_) => {
                let index = self.card_index(frame[0])?;
                let function = FunctionCode::from_u8(frame[1])?;
                return Some(exception_response(
                    self.cards[index].address,
                    function,
                    ExceptionCode::IllegalDataValue,
                ));
            }
        };

        let index = self.card_index(addressed)?;
        Some(self.execute(index, request))
    }

    fn execute(&mut self, index: usize, request: Request) -> Bytes {
        let address = self.cards[index].address;
        match request {
            Request::ReadCoils { start, quantity } => {
                let Some(range) = channel_range(start, quantity) else {
                    return exception_response(
                        address,
                        FunctionCode::ReadCoils,
                        ExceptionCode::IllegalDataAddress,
                    );
                };
                coils_response(address, &self.cards[index].coils[range])
            }
            Request::ReadHoldingRegisters { start, quantity } => {
                // The only readable register is the card's own address.
                if start != SLAVE_ID_REGISTER || quantity != 1 {
                    return exception_response(
                        address,
                        FunctionCode::ReadHoldingRegisters,
                        ExceptionCode::IllegalDataAddress,
                    );
                }
                registers_response(address, &[u16::from(address.as_u8())])
            }
            Request::WriteSingleCoil { offset, on } => {
                if usize::from(offset) >= CHANNELS_PER_CARD {
                    return exception_response(
                        address,
                        FunctionCode::WriteSingleCoil,
                        ExceptionCode::IllegalDataAddress,
                    );
                }
                self.cards[index].write_coil(usize::from(offset), on);
                write_single_coil(address, offset, on)
            }
            Request::WriteSingleRegister { register, value } => {
                if register != SLAVE_ID_REGISTER {
                    return exception_response(
                        address,
                        FunctionCode::WriteSingleRegister,
                        ExceptionCode::IllegalDataAddress,
                    );
                }
                let new_address = u8::try_from(value)
                    .ok()
                    .and_then(|raw| SlaveAddress::new(raw).ok());
                let Some(new_address) = new_address else {
                    return exception_response(
                        address,
                        FunctionCode::WriteSingleRegister,
                        ExceptionCode::IllegalDataValue,
                    );
                };
                // The echo still carries the old address; the new one
                // takes effect for the next frame.
                let echo = write_single_register(address, register, value);
                self.cards[index].address = new_address;
                echo
            }
            Request::WriteMultipleCoils { start, states } => {
                if self.cards[index].rejects_multi_coil {
                    return exception_response(
                        address,
                        FunctionCode::WriteMultipleCoils,
                        ExceptionCode::IllegalFunction,
                    );
                }
                let quantity = states.len() as u16;
                let Some(range) = channel_range(start, quantity) else {
                    return exception_response(
                        address,
                        FunctionCode::WriteMultipleCoils,
                        ExceptionCode::IllegalDataAddress,
                    );
                };
                for (offset, on) in range.zip(states) {
                    self.cards[index].write_coil(offset, on);
                }
                multiple_coils_ack(address, start, quantity)
            }
        }
    }

    fn maybe_corrupt(&mut self, reply: Bytes) -> Bytes {
        if self.corrupt_replies == 0 {
            return reply;
        }
        self.corrupt_replies -= 1;
        let mut bytes = BytesMut::from(&reply[..]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        bytes.freeze()
    }

    fn card_index(&self, address: u8) -> Option<usize> {
        self.cards
            .iter()
            .position(|card| card.address.as_u8() == address)
    }

    fn find_card(&self, address: u8) -> Result<usize> {
        self.card_index(address)
            .ok_or_else(|| Error::not_found("relay card", address.to_string()))
    }
}

fn channel_range(start: u16, quantity: u16) -> Option<std::ops::Range<usize>> {
    let start = usize::from(start);
    let end = start.checked_add(usize::from(quantity))?;
    (end <= CHANNELS_PER_CARD).then_some(start..end)
}

/// Builds a [`VirtualBus`] card by card.
#[derive(Debug, Default)]
pub struct VirtualBusBuilder {
    cards: Vec<(u8, bool)>,
}

impl VirtualBusBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a healthy card at the given address.
    #[must_use]
    pub fn card(mut self, address: u8) -> Self {
        self.cards.push((address, false));
        self
    }

    /// Add a card whose firmware rejects the multi-coil function.
    #[must_use]
    pub fn legacy_card(mut self, address: u8) -> Self {
        self.cards.push((address, true));
        self
    }

    /// Assemble the chain.
    ///
    /// # Errors
    ///
    /// Returns a validation error on an invalid or duplicate address.
    pub fn build(self) -> Result<VirtualBus> {
        let mut bus = VirtualBus::new();
        for (address, legacy) in self.cards {
            bus.install_card(address)?;
            if legacy {
                bus.mark_legacy(address)?;
            }
        }
        Ok(bus)
    }
}
