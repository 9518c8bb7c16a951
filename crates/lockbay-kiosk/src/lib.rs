//! Per-kiosk daemon library.
//!
//! A kiosk owns one RS-485 bus of relay cards and serves one queue of
//! commands from the coordination server. The pieces:
//!
//! - [`config`] — env-driven configuration (`KIOSK_ID`, serial device,
//!   server URL, pulse tunables).
//! - [`client`] — the HTTP client to the server and the [`CommandApi`]
//!   seam the runner is generic over.
//! - [`executor`] — turns one command descriptor into hardware pulses
//!   and a result report.
//! - [`runner`] — the poll → claim → execute → report loop, heartbeat
//!   push, and startup recovery.
//!
//! [`CommandApi`]: client::CommandApi

pub mod client;
pub mod config;
pub mod executor;
pub mod runner;
