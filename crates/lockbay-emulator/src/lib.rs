//! Relay hardware emulation for development and tests.
//!
//! This crate contains an in-process model of the RS-485 relay chain:
//! the cards' Modbus behavior, scriptable fault injection, and a
//! drop-in link implementation for running the kiosk stack with no
//! hardware attached.

pub mod board;
pub mod link;

pub use board::{CHANNELS_PER_CARD, FaultPlan, VirtualBus, VirtualBusBuilder};
pub use link::EmulatedRelayLink;

// Re-export the link trait from the hardware crate (single source of truth)
pub use lockbay_hardware::RelayLink;
