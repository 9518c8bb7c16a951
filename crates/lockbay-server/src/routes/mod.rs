//! HTTP route handlers, grouped by resource.
//!
//! Handlers stay thin: parse path/body, call into [`crate::service`],
//! wrap the result in the [`crate::response::DataResponse`] envelope.
//! Error translation to status codes lives in [`crate::error::AppError`].

pub mod commands;
pub mod health;
pub mod kiosks;
pub mod lockers;

use lockbay_core::{Error as CoreError, KioskId, LockerId};

use crate::error::AppResult;

/// Parse a kiosk id path segment.
pub(crate) fn parse_kiosk(raw: &str) -> AppResult<KioskId> {
    raw.parse::<KioskId>().map_err(Into::into)
}

/// Parse a locker id path segment.
pub(crate) fn parse_locker(raw: &str) -> AppResult<LockerId> {
    let id: u16 = raw
        .parse()
        .map_err(|_| CoreError::validation(format!("Invalid locker id '{raw}'")))?;
    LockerId::new(id).map_err(Into::into)
}
