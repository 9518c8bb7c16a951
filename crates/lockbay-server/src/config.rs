use anyhow::Context;
use chrono::Duration;

use lockbay_core::constants::{
    DEFAULT_OFFLINE_THRESHOLD_SECS, DEFAULT_POLL_BATCH, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RESERVATION_TTL_SECS, DEFAULT_STALE_EXECUTING_SECS,
};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// SQLite database path (default: `lockbay.db`).
    pub database_path: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long a reservation holds its locker before the TTL sweep
    /// returns it to `free`.
    pub reservation_ttl_secs: i64,
    /// How long a claimed command may sit `executing` before the
    /// watchdog forcibly fails it.
    pub stale_executing_secs: i64,
    /// Heartbeat silence after which a kiosk reads as offline.
    pub offline_threshold_secs: i64,
    /// Maximum pending commands handed to one kiosk poll.
    pub poll_batch: i64,
    /// Poll cadence the heartbeat response asks kiosks to use.
    pub poll_interval_ms: u64,
    /// Cadence of the background sweeps (TTL expiry, stale watchdog).
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default      |
    /// |--------------------------|--------------|
    /// | `HOST`                   | `0.0.0.0`    |
    /// | `PORT`                   | `8080`       |
    /// | `DATABASE_URL`           | `lockbay.db` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`         |
    /// | `RESERVATION_TTL_SECS`   | `90`         |
    /// | `STALE_EXECUTING_SECS`   | `120`        |
    /// | `OFFLINE_THRESHOLD_SECS` | `90`         |
    /// | `POLL_BATCH`             | `8`          |
    /// | `POLL_INTERVAL_MS`       | `1000`       |
    /// | `SWEEP_INTERVAL_SECS`    | `15`         |
    ///
    /// # Errors
    /// Returns an error when a set variable fails to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| "lockbay.db".into());

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .context("REQUEST_TIMEOUT_SECS must be a valid u64")?;

        let reservation_ttl_secs: i64 = std::env::var("RESERVATION_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_RESERVATION_TTL_SECS.to_string())
            .parse()
            .context("RESERVATION_TTL_SECS must be a valid i64")?;

        let stale_executing_secs: i64 = std::env::var("STALE_EXECUTING_SECS")
            .unwrap_or_else(|_| DEFAULT_STALE_EXECUTING_SECS.to_string())
            .parse()
            .context("STALE_EXECUTING_SECS must be a valid i64")?;

        let offline_threshold_secs: i64 = std::env::var("OFFLINE_THRESHOLD_SECS")
            .unwrap_or_else(|_| DEFAULT_OFFLINE_THRESHOLD_SECS.to_string())
            .parse()
            .context("OFFLINE_THRESHOLD_SECS must be a valid i64")?;

        let poll_batch: i64 = std::env::var("POLL_BATCH")
            .unwrap_or_else(|_| DEFAULT_POLL_BATCH.to_string())
            .parse()
            .context("POLL_BATCH must be a valid i64")?;

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_MS.to_string())
            .parse()
            .context("POLL_INTERVAL_MS must be a valid u64")?;

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .context("SWEEP_INTERVAL_SECS must be a valid u64")?;

        Ok(Self {
            host,
            port,
            database_path,
            request_timeout_secs,
            reservation_ttl_secs,
            stale_executing_secs,
            offline_threshold_secs,
            poll_batch,
            poll_interval_ms,
            sweep_interval_secs,
        })
    }

    /// Reservation TTL as a chrono duration.
    pub fn reservation_ttl(&self) -> Duration {
        Duration::seconds(self.reservation_ttl_secs)
    }

    /// Stale-executing threshold as a chrono duration.
    pub fn stale_after(&self) -> Duration {
        Duration::seconds(self.stale_executing_secs)
    }

    /// Offline threshold as a chrono duration.
    pub fn offline_after(&self) -> Duration {
        Duration::seconds(self.offline_threshold_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_path: "lockbay.db".to_string(),
            request_timeout_secs: 30,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS,
            stale_executing_secs: DEFAULT_STALE_EXECUTING_SECS,
            offline_threshold_secs: DEFAULT_OFFLINE_THRESHOLD_SECS,
            poll_batch: i64::from(DEFAULT_POLL_BATCH),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sweep_interval_secs: 15,
        }
    }
}
