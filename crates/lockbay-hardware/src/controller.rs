//! Relay card controller.
//!
//! Sits between command execution and the serial link: turns "open this
//! channel" into the pulse sequence the latches need, retries transient
//! bus failures, and degrades to per-coil writes on cards whose
//! firmware rejects the multi-coil function.

use std::ops::RangeInclusive;
use std::time::Duration;

use tokio::time::sleep;

use lockbay_core::SlaveAddress;
use lockbay_core::constants::{
    COILS_PER_CARD, DEFAULT_BURST_GAP_MS, DEFAULT_BURST_PULSES, DEFAULT_MAX_WRITE_ATTEMPTS,
    DEFAULT_PULSE_HOLD_MS, DEFAULT_RETRY_DELAY_MS, MAX_PULSE_HOLD_MS, MIN_PULSE_HOLD_MS,
};
use lockbay_modbus::frame::{FunctionCode, SLAVE_ID_REGISTER, expected_response_len};
use lockbay_modbus::{ModbusError, Response, parse_response, request};

use crate::error::{HardwareError, Result};
use crate::mapper::CoilTarget;
use crate::transport::RelayLink;

/// Tunables for pulse shape and failure handling.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a latch coil stays energized, in milliseconds.
    pub pulse_hold_ms: u64,
    /// Attempts per coil write before the failure is surfaced.
    pub max_write_attempts: u32,
    /// Delay between write attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Pulses fired by a burst open.
    pub burst_pulses: u32,
    /// Gap between burst pulses, in milliseconds.
    pub burst_gap_ms: u64,
    /// Read the coil back after each write and retry on disagreement.
    pub verify_writes: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pulse_hold_ms: DEFAULT_PULSE_HOLD_MS,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            burst_pulses: DEFAULT_BURST_PULSES,
            burst_gap_ms: DEFAULT_BURST_GAP_MS,
            verify_writes: false,
        }
    }
}

impl ControllerConfig {
    /// Set the pulse hold time, clamped to the range the latches accept.
    pub fn with_pulse_hold(mut self, hold_ms: u64) -> Self {
        self.pulse_hold_ms = hold_ms.clamp(MIN_PULSE_HOLD_MS, MAX_PULSE_HOLD_MS);
        self
    }
}

/// Which write primitive the controller currently uses.
///
/// Starts on the multi-coil function; a card that rejects it with
/// "illegal function" demotes the whole session to single-coil writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoilWriteMode {
    Multi,
    Single,
}

/// Drives relay cards over a [`RelayLink`].
pub struct RelayController<L: RelayLink> {
    link: L,
    config: ControllerConfig,
    write_mode: CoilWriteMode,
}

impl<L: RelayLink> RelayController<L> {
    pub fn new(link: L, config: ControllerConfig) -> Self {
        Self {
            link,
            config,
            write_mode: CoilWriteMode::Multi,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Fire one open pulse: energize, hold, release.
    ///
    /// The release write is attempted even when the energize failed, so
    /// a half-landed write cannot leave the coil drawing current.
    pub async fn pulse(&mut self, target: CoilTarget) -> Result<()> {
        self.pulse_for(target, Duration::from_millis(self.config.pulse_hold_ms))
            .await
    }

    /// Fire one pulse with an explicit hold time.
    pub async fn pulse_for(&mut self, target: CoilTarget, hold: Duration) -> Result<()> {
        if let Err(on_err) = self.set_coil(target, true).await {
            if let Err(off_err) = self.set_coil(target, false).await {
                tracing::error!(
                    target = %target,
                    error = %off_err,
                    "release write failed after failed energize"
                );
            }
            return Err(on_err);
        }
        sleep(hold).await;
        self.set_coil(target, false).await
    }

    /// Repeatedly pulse one channel to free a stuck mechanism.
    ///
    /// Keeps firing through individual pulse failures; succeeds if any
    /// pulse completed.
    pub async fn burst_open(&mut self, target: CoilTarget) -> Result<()> {
        let shots = self.config.burst_pulses.max(1);
        let mut succeeded = false;
        let mut last_err = None;

        for shot in 1..=shots {
            match self.pulse(target).await {
                Ok(()) => succeeded = true,
                Err(err) => {
                    tracing::warn!(target = %target, shot, error = %err, "burst pulse failed");
                    last_err = Some(err);
                }
            }
            if shot < shots {
                sleep(Duration::from_millis(self.config.burst_gap_ms)).await;
            }
        }

        match (succeeded, last_err) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(err),
            (false, None) => Err(HardwareError::link_lost("burst fired no pulses")),
        }
    }

    /// Drive one coil to the given state, with retries and demotion.
    pub async fn set_coil(&mut self, target: CoilTarget, on: bool) -> Result<()> {
        let offset = target.coil.wire_offset();
        let mut attempt = 1u32;

        loop {
            let written = match self.write_mode {
                CoilWriteMode::Multi => self.write_run_raw(target.slave, offset, &[on]).await,
                CoilWriteMode::Single => self.write_coil_raw(target.slave, offset, on).await,
            };
            let err = match written {
                Ok(()) => {
                    if !self.config.verify_writes {
                        return Ok(());
                    }
                    match self.verify_coil(target, on).await {
                        Ok(()) => return Ok(()),
                        Err(err) => err,
                    }
                }
                Err(err) => err,
            };

            if err.is_illegal_function() && self.write_mode == CoilWriteMode::Multi {
                self.demote(target.slave);
                continue;
            }
            if err.is_retryable() && attempt < self.config.max_write_attempts {
                tracing::warn!(
                    slave = target.slave.as_u8(),
                    coil = target.coil.as_u8(),
                    attempt,
                    error = %err,
                    "coil write failed, retrying"
                );
                attempt += 1;
                sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                continue;
            }
            return Err(err);
        }
    }

    /// Read the state of all channels on one card.
    pub async fn read_channels(&mut self, slave: SlaveAddress) -> Result<Vec<bool>> {
        let frame = request::read_coils(slave, 0, COILS_PER_CARD)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?;
        let reply = self
            .link
            .transact(
                &frame,
                expected_response_len(FunctionCode::ReadCoils, COILS_PER_CARD),
            )
            .await?;
        match parse_response(slave, FunctionCode::ReadCoils, &reply)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?
        {
            Response::Coils(mut states) => {
                states.truncate(COILS_PER_CARD as usize);
                Ok(states)
            }
            other => Err(unexpected_reply(slave, other)),
        }
    }

    /// Release every channel on one card.
    ///
    /// Tries a single multi-coil write first; if that is unavailable or
    /// fails, sweeps the channels one by one so a single bad channel
    /// cannot keep the rest energized.
    pub async fn all_off(&mut self, slave: SlaveAddress) -> Result<()> {
        if self.write_mode == CoilWriteMode::Multi {
            match self
                .write_run_raw(slave, 0, &[false; COILS_PER_CARD as usize])
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if err.is_illegal_function() => self.demote(slave),
                Err(err) => {
                    tracing::warn!(
                        slave = slave.as_u8(),
                        error = %err,
                        "bulk release failed, sweeping channels"
                    );
                }
            }
        }

        let mut failed = None;
        for offset in 0..COILS_PER_CARD {
            if let Err(err) = self.write_coil_raw(slave, offset, false).await {
                tracing::warn!(
                    slave = slave.as_u8(),
                    offset,
                    error = %err,
                    "channel did not turn off"
                );
                failed = Some(err);
            }
        }
        match failed {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Read the bus address a card believes it has.
    pub async fn read_slave_address(&mut self, slave: SlaveAddress) -> Result<u8> {
        let frame = request::read_holding_registers(slave, SLAVE_ID_REGISTER, 1)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?;
        let reply = self
            .link
            .transact(
                &frame,
                expected_response_len(FunctionCode::ReadHoldingRegisters, 1),
            )
            .await?;
        match parse_response(slave, FunctionCode::ReadHoldingRegisters, &reply)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?
        {
            Response::Registers(values) => values
                .first()
                .map(|value| *value as u8)
                .ok_or_else(|| {
                    HardwareError::protocol(
                        slave.as_u8(),
                        ModbusError::Malformed("empty register reply".to_string()),
                    )
                }),
            other => Err(unexpected_reply(slave, other)),
        }
    }

    /// Re-address a card on the bus.
    ///
    /// The new address takes effect immediately; subsequent requests to
    /// this card must use `new`.
    pub async fn assign_slave_address(
        &mut self,
        current: SlaveAddress,
        new: SlaveAddress,
    ) -> Result<()> {
        let value = u16::from(new.as_u8());
        let frame = request::write_single_register(current, SLAVE_ID_REGISTER, value);
        let reply = self
            .link
            .transact(
                &frame,
                expected_response_len(FunctionCode::WriteSingleRegister, 1),
            )
            .await?;
        match parse_response(current, FunctionCode::WriteSingleRegister, &reply)
            .map_err(|err| HardwareError::protocol(current.as_u8(), err))?
        {
            Response::RegisterWrite { register, value: echoed }
                if register == SLAVE_ID_REGISTER && echoed == value =>
            {
                tracing::info!(
                    from = current.as_u8(),
                    to = new.as_u8(),
                    "relay card re-addressed"
                );
                Ok(())
            }
            other => Err(unexpected_reply(current, other)),
        }
    }

    /// Probe a range of bus addresses and report which cards answered.
    ///
    /// Silent addresses are normal during a scan; only a dead link
    /// aborts it.
    pub async fn scan_bus(&mut self, addresses: RangeInclusive<u8>) -> Result<Vec<SlaveAddress>> {
        let mut found = Vec::new();
        for addr in addresses {
            let Ok(slave) = SlaveAddress::new(addr) else {
                continue;
            };
            match self.read_channels(slave).await {
                Ok(_) => {
                    tracing::debug!(slave = addr, "card answered scan probe");
                    found.push(slave);
                }
                Err(
                    err @ (HardwareError::PortUnavailable { .. }
                    | HardwareError::LinkLost { .. }
                    | HardwareError::Io(_)),
                ) => return Err(err),
                Err(_) => {}
            }
        }
        Ok(found)
    }

    fn demote(&mut self, slave: SlaveAddress) {
        self.write_mode = CoilWriteMode::Single;
        tracing::warn!(
            slave = slave.as_u8(),
            "multi-coil write rejected, staying on single-coil writes"
        );
    }

    async fn verify_coil(&mut self, target: CoilTarget, on: bool) -> Result<()> {
        let states = self.read_channels(target.slave).await?;
        let index = usize::from(target.coil.wire_offset());
        if states.get(index).copied() == Some(on) {
            Ok(())
        } else {
            Err(HardwareError::VerificationFailed {
                slave: target.slave.as_u8(),
                coil: target.coil.wire_offset(),
            })
        }
    }

    async fn write_coil_raw(&mut self, slave: SlaveAddress, offset: u16, on: bool) -> Result<()> {
        let frame = request::write_single_coil(slave, offset, on);
        let reply = self
            .link
            .transact(
                &frame,
                expected_response_len(FunctionCode::WriteSingleCoil, 1),
            )
            .await?;
        match parse_response(slave, FunctionCode::WriteSingleCoil, &reply)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?
        {
            Response::CoilWrite {
                offset: echo_offset,
                on: echo_on,
            } if echo_offset == offset && echo_on == on => Ok(()),
            other => Err(unexpected_reply(slave, other)),
        }
    }

    async fn write_run_raw(
        &mut self,
        slave: SlaveAddress,
        start: u16,
        states: &[bool],
    ) -> Result<()> {
        let frame = request::write_multiple_coils(slave, start, states)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?;
        let reply = self
            .link
            .transact(
                &frame,
                expected_response_len(FunctionCode::WriteMultipleCoils, states.len() as u16),
            )
            .await?;
        match parse_response(slave, FunctionCode::WriteMultipleCoils, &reply)
            .map_err(|err| HardwareError::protocol(slave.as_u8(), err))?
        {
            Response::MultipleCoilsAck { start: ack_start, quantity }
                if ack_start == start && usize::from(quantity) == states.len() =>
            {
                Ok(())
            }
            other => Err(unexpected_reply(slave, other)),
        }
    }
}

fn unexpected_reply(slave: SlaveAddress, reply: Response) -> HardwareError {
    HardwareError::protocol(
        slave.as_u8(),
        ModbusError::Malformed(format!("reply does not match request: {reply:?}")),
    )
}
