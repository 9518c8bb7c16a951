//! Background sweeps.
//!
//! One periodic task covers the two time-driven cleanups: reservations
//! whose TTL elapsed go back to `Free`, and commands stuck `executing`
//! past the stale threshold are forcibly failed (the watchdog side of
//! §startup recovery, catching crashes between claims and results while
//! the server stays up). Both passes are idempotent, so an overlap with
//! a kiosk-triggered recovery is harmless.

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::service::{lockers, queue};
use crate::state::AppState;

/// Spawn the sweep loop. Cancelling the token stops it after the
/// current pass.
pub fn spawn_sweeps(state: AppState, shutdown: CancellationToken) -> JoinHandle<()> {
    let period = std::time::Duration::from_secs(state.config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so boot recovery in
        // main() is not doubled.
        ticker.tick().await;

        info!(period_secs = period.as_secs(), "Background sweeps started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Background sweeps stopping");
                    return;
                }
                _ = ticker.tick() => {
                    run_sweep_pass(&state).await;
                }
            }
        }
    })
}

/// One pass: reservation expiry, then the stale-command watchdog.
pub async fn run_sweep_pass(state: &AppState) {
    let now = Utc::now();

    match lockers::expire_stale_reservations(&state.db, now - state.config.reservation_ttl()).await
    {
        Ok(0) => {}
        Ok(expired) => info!(expired, "Reservation TTL sweep"),
        Err(err) => error!(error = %err, "Reservation TTL sweep failed"),
    }

    match queue::recover_stale(&state.db, now - state.config.stale_after(), None).await {
        Ok(recovered) if recovered.is_empty() => {}
        Ok(recovered) => info!(recovered = recovered.len(), "Stale command watchdog"),
        Err(err) => error!(error = %err, "Stale command watchdog failed"),
    }
}
