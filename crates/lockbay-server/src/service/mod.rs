//! Domain services behind the HTTP handlers.
//!
//! Each submodule owns one slice of coordination logic: `queue` moves
//! commands through their lifecycle and drives the locker transitions
//! that follow, `lockers` handles issuer-facing holds, `sync` keeps the
//! zone configuration aligned with the relay-card inventory. Handlers
//! and background sweeps both call in here; nothing in this layer knows
//! about HTTP.

pub mod lockers;
pub mod queue;
pub mod sync;
