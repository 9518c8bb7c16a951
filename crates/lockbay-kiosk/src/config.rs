//! Kiosk configuration.
//!
//! Everything is environment-driven. Production kiosks carry their
//! identity in a conf file (`/etc/lockbay/kiosk.conf`, dotenv format)
//! loaded before the environment is read; `main` handles that via
//! `dotenvy::from_path`.

use std::time::Duration;

use anyhow::Context;

use lockbay_core::constants::{
    DEFAULT_BULK_INTERVAL_MS, DEFAULT_BUZZER_PULSE_MS, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PULSE_HOLD_MS,
};
use lockbay_core::{CoilAddress, KioskId, SlaveAddress};

/// Default location of the kiosk identity file.
pub const DEFAULT_CONF_PATH: &str = "/etc/lockbay/kiosk.conf";

/// Kiosk daemon configuration.
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// This kiosk's identity, as registered with the server.
    pub kiosk_id: KioskId,
    /// Base URL of the coordination server, e.g. `http://server:8080`.
    pub server_url: String,
    /// RS-485 device node (default `/dev/ttyUSB0`).
    pub serial_port: String,
    /// Zone label reported with heartbeats (cosmetic, not the mapper's
    /// zone table).
    pub zone_label: Option<String>,
    /// Hardware identifier reported with heartbeats.
    pub hardware_id: Option<String>,
    /// Latch pulse hold, milliseconds.
    pub pulse_hold_ms: u64,
    /// Default gap between bulk-open pulses, milliseconds.
    pub bulk_interval_ms: u64,
    /// Queue poll cadence, milliseconds.
    pub poll_interval_ms: u64,
    /// Heartbeat cadence, seconds.
    pub heartbeat_interval_secs: u64,
    /// Buzzer channel, when the kiosk has one wired.
    pub buzzer_slave: Option<SlaveAddress>,
    pub buzzer_coil: Option<CoilAddress>,
    /// Buzzer beep length, milliseconds.
    pub buzzer_pulse_ms: u64,
    /// Run against the emulated bus instead of a serial device.
    pub mock_hardware: bool,
    /// Cards installed on the emulated bus in mock mode.
    pub mock_cards: u8,
}

impl KioskConfig {
    /// Load configuration from environment variables.
    ///
    /// `KIOSK_ID` is required; everything else has a default.
    ///
    /// | Env Var                   | Default         |
    /// |---------------------------|-----------------|
    /// | `KIOSK_ID`                | *(required)*    |
    /// | `SERVER_URL`              | `http://127.0.0.1:8080` |
    /// | `SERIAL_PORT`             | `/dev/ttyUSB0`  |
    /// | `KIOSK_ZONE`              | *(unset)*       |
    /// | `HARDWARE_ID`             | *(unset)*       |
    /// | `PULSE_HOLD_MS`           | `400`           |
    /// | `BULK_INTERVAL_MS`        | `300`           |
    /// | `POLL_INTERVAL_MS`        | `1000`          |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`            |
    /// | `BUZZER_SLAVE`            | *(unset)*       |
    /// | `BUZZER_COIL`             | *(unset)*       |
    /// | `BUZZER_PULSE_MS`         | `200`           |
    /// | `MOCK_HARDWARE`           | `false`         |
    /// | `MOCK_CARDS`              | `2`             |
    ///
    /// # Errors
    /// Returns an error when `KIOSK_ID` is missing or any set variable
    /// fails to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let kiosk_id: KioskId = std::env::var("KIOSK_ID")
            .context("KIOSK_ID must be set")?
            .parse()
            .context("KIOSK_ID must be a valid kiosk id")?;

        let server_url =
            std::env::var("SERVER_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into());
        let serial_port = std::env::var("SERIAL_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".into());
        let zone_label = std::env::var("KIOSK_ZONE").ok();
        let hardware_id = std::env::var("HARDWARE_ID").ok();

        let pulse_hold_ms = env_u64("PULSE_HOLD_MS", DEFAULT_PULSE_HOLD_MS)?;
        let bulk_interval_ms = env_u64("BULK_INTERVAL_MS", DEFAULT_BULK_INTERVAL_MS)?;
        let poll_interval_ms = env_u64("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let heartbeat_interval_secs =
            env_u64("HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL_SECS)?;
        let buzzer_pulse_ms = env_u64("BUZZER_PULSE_MS", DEFAULT_BUZZER_PULSE_MS)?;

        let buzzer_slave = match std::env::var("BUZZER_SLAVE") {
            Ok(raw) => {
                let addr: u8 = raw.parse().context("BUZZER_SLAVE must be a valid u8")?;
                Some(SlaveAddress::new(addr).context("BUZZER_SLAVE out of range")?)
            }
            Err(_) => None,
        };
        let buzzer_coil = match std::env::var("BUZZER_COIL") {
            Ok(raw) => {
                let coil: u8 = raw.parse().context("BUZZER_COIL must be a valid u8")?;
                Some(CoilAddress::new(coil).context("BUZZER_COIL out of range")?)
            }
            Err(_) => None,
        };

        let mock_hardware = std::env::var("MOCK_HARDWARE")
            .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let mock_cards = std::env::var("MOCK_CARDS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .context("MOCK_CARDS must be a valid u8")?;

        Ok(Self {
            kiosk_id,
            server_url,
            serial_port,
            zone_label,
            hardware_id,
            pulse_hold_ms,
            bulk_interval_ms,
            poll_interval_ms,
            heartbeat_interval_secs,
            buzzer_slave,
            buzzer_coil,
            buzzer_pulse_ms,
            mock_hardware,
            mock_cards,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn bulk_interval(&self) -> Duration {
        Duration::from_millis(self.bulk_interval_ms)
    }
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a valid u64")),
        Err(_) => Ok(default),
    }
}
