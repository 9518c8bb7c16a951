//! Core constants for locker hardware coordination.
//!
//! These are the domain-level defaults shared by the server, the kiosk
//! daemon, and the hardware controller. Every value here is a *default*:
//! the corresponding config structs expose overrides for deployment-time
//! tuning, but code must never hardcode a literal where one of these
//! constants exists.
//!
//! # Hardware Layout
//!
//! A kiosk drives one RS-485 bus with up to [`MAX_RELAY_CARDS`] relay
//! cards. Every card exposes exactly [`COILS_PER_CARD`] coils, one per
//! electromagnetic lock:
//!
//! ```text
//! locker 1..16   -> card 1, coils 1..16
//! locker 17..32  -> card 2, coils 1..16
//! ...
//! ```
//!
//! Zones remap this default layout; see the `zone` module.

// ============================================================================
// Relay Hardware Layout
// ============================================================================

/// Number of relay outputs (coils) on one relay card.
///
/// Fixed at 16 in this design; the mapper, the zone extension algorithm,
/// and the provisioning logic all assume it.
pub const COILS_PER_CARD: u16 = 16;

/// Lowest valid Modbus slave address for a relay card.
pub const MIN_SLAVE_ADDRESS: u8 = 1;

/// Highest valid Modbus slave address for a relay card.
///
/// Addresses above 247 are reserved by the Modbus specification.
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Upper bound on relay cards per kiosk bus.
///
/// Well below the Modbus addressing limit; a kiosk wall tops out at a few
/// hundred lockers.
pub const MAX_RELAY_CARDS: u16 = 32;

/// Highest locker id a kiosk may address.
///
/// Derived from [`MAX_RELAY_CARDS`] * [`COILS_PER_CARD`].
pub const MAX_LOCKER_ID: u16 = MAX_RELAY_CARDS * COILS_PER_CARD;

// ============================================================================
// Pulse Timing
// ============================================================================

/// Default coil energize time for one open pulse (milliseconds).
///
/// The lock anchor needs roughly this long to retract; shorter pulses fail
/// to open stiff doors, longer pulses heat the coil for no benefit.
pub const DEFAULT_PULSE_HOLD_MS: u64 = 400;

/// Minimum accepted pulse hold (milliseconds).
pub const MIN_PULSE_HOLD_MS: u64 = 100;

/// Maximum accepted pulse hold (milliseconds).
///
/// The shared power rail is not rated for longer continuous energize
/// cycles.
pub const MAX_PULSE_HOLD_MS: u64 = 2000;

/// Default minimum spacing between per-locker opens in a bulk operation
/// (milliseconds).
///
/// Only one coil may be energized at a time on a kiosk bus; this interval
/// also lets the power rail recover between pulses.
pub const DEFAULT_BULK_INTERVAL_MS: u64 = 300;

// ============================================================================
// Hardware Retry Policy
// ============================================================================

/// Total write attempts per coil operation (first try + retries).
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

/// Fixed delay between hardware write retries (milliseconds).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Pulses issued by one maintenance burst.
///
/// Burst mode hammers a stuck mechanism with repeated pulses; the count is
/// bounded so a dead lock cannot keep the bus busy forever.
pub const DEFAULT_BURST_PULSES: u32 = 5;

/// Gap between burst pulses (milliseconds).
pub const DEFAULT_BURST_GAP_MS: u64 = 500;

// ============================================================================
// Command Queue
// ============================================================================

/// Default kiosk poll interval (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Maximum pending commands returned by a single poll.
pub const DEFAULT_POLL_BATCH: u32 = 8;

/// Age after which an `executing` command is considered stale (seconds).
///
/// Must comfortably exceed the longest legitimate execution: a full-wall
/// bulk open with retries stays under half of this.
pub const DEFAULT_STALE_EXECUTING_SECS: i64 = 120;

// ============================================================================
// Reservation / Fleet Liveness
// ============================================================================

/// Reservation time-to-live (seconds).
///
/// A `Reserved` locker falls back to `Free` when the owner does not
/// confirm within this window. Source documents disagree on the literal
/// (30 s vs 90 s); 90 s is the default here and deployments may override
/// it. See DESIGN.md.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 90;

/// Kiosk heartbeat push interval (seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// A kiosk with no heartbeat for this long is reported offline (seconds).
///
/// Three missed heartbeats at the default interval.
pub const DEFAULT_OFFLINE_THRESHOLD_SECS: i64 = 90;

// ============================================================================
// Buzzer
// ============================================================================

/// Default buzzer beep length (milliseconds).
pub const DEFAULT_BUZZER_PULSE_MS: u64 = 200;

/// Maximum beeps accepted in one buzzer command.
pub const MAX_BUZZER_BEEPS: u8 = 5;

// ============================================================================
// Identifier Constraints
// ============================================================================

/// Maximum kiosk id length (characters).
pub const MAX_KIOSK_ID_LENGTH: usize = 64;

/// Maximum owner key length (characters).
pub const MAX_OWNER_KEY_LENGTH: usize = 64;

/// Maximum lockers one bulk_open may target.
pub const MAX_BULK_LOCKERS: usize = 64;
