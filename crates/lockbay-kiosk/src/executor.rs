//! Command execution against the relay bus.
//!
//! One claimed command comes in as a [`CommandDescriptor`]; what goes
//! back is always a [`CommandResultReport`]. Hardware failures never
//! escape as errors: they are folded into the report (error code, per
//! locker outcomes) so the server can persist them and move the locker
//! state machine accordingly. Block, unblock, and reset are state-only
//! commands; the kiosk acknowledges them without touching the bus, and
//! the server applies the transition when the result lands.

use std::time::Duration;

use tokio::time::{Instant, sleep};

use lockbay_core::wire::{CommandDescriptor, CommandResultReport, LockerOutcome};
use lockbay_core::{CommandPayload, LockerId, SlaveAddress};
use lockbay_hardware::{CoilMapper, CoilTarget, HardwareError, RelayController, RelayLink};

/// Executor tunables that are not part of the controller config.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Gap between per-locker opens in a bulk command without an
    /// explicit `interval_ms`.
    pub bulk_interval: Duration,
    /// Relay channel driving the kiosk buzzer, when one is wired.
    pub buzzer: Option<CoilTarget>,
    /// Beep length for buzzer commands without an explicit duration.
    pub buzzer_pulse: Duration,
    /// Attempts the controller makes per coil write. Reported as the
    /// retry count of a failed hardware command.
    pub max_write_attempts: u32,
}

/// Turns claimed commands into relay pulses and result reports.
pub struct CommandExecutor<L: RelayLink> {
    controller: RelayController<L>,
    mapper: CoilMapper,
    options: ExecutorOptions,
}

impl<L: RelayLink> CommandExecutor<L> {
    pub fn new(controller: RelayController<L>, mapper: CoilMapper, options: ExecutorOptions) -> Self {
        Self {
            controller,
            mapper,
            options,
        }
    }

    /// Swap in a fresh mapper after a zone layout refresh.
    pub fn set_mapper(&mut self, mapper: CoilMapper) {
        self.mapper = mapper;
    }

    /// Release every channel on the given cards.
    ///
    /// Run at startup so a crash mid-pulse cannot leave a coil drawing
    /// current across a daemon restart. Per-card failures are logged and
    /// the sweep continues.
    pub async fn release_all(&mut self, cards: &[SlaveAddress]) {
        for &card in cards {
            if let Err(err) = self.controller.all_off(card).await {
                tracing::warn!(slave = card.as_u8(), error = %err, "startup release sweep failed");
            }
        }
    }

    /// Execute one command and produce its result report.
    pub async fn execute(&mut self, descriptor: &CommandDescriptor) -> CommandResultReport {
        let started = Instant::now();
        let mut report = match &descriptor.payload {
            CommandPayload::Open { locker_id, burst } => {
                match self.open_one(*locker_id, *burst).await {
                    Ok(()) => self.success(),
                    Err(err) => {
                        tracing::warn!(
                            command = %descriptor.id,
                            locker = locker_id.as_u16(),
                            error = %err,
                            "open failed"
                        );
                        self.failure(&err)
                    }
                }
            }
            CommandPayload::BulkOpen {
                locker_ids,
                interval_ms,
            } => {
                let gap = interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.options.bulk_interval);
                self.bulk_open(descriptor, locker_ids, gap).await
            }
            CommandPayload::Block { .. }
            | CommandPayload::Unblock { .. }
            | CommandPayload::Reset { .. } => self.success(),
            CommandPayload::Buzzer { beeps, duration_ms } => {
                self.buzz(*beeps, *duration_ms).await
            }
        };
        report.duration_ms = started.elapsed().as_millis() as i64;
        report
    }

    async fn open_one(&mut self, locker: LockerId, burst: bool) -> Result<(), HardwareError> {
        let target = self.mapper.resolve(locker)?;
        if burst {
            self.controller.burst_open(target).await
        } else {
            self.controller.pulse(target).await
        }
    }

    async fn bulk_open(
        &mut self,
        descriptor: &CommandDescriptor,
        lockers: &[LockerId],
        gap: Duration,
    ) -> CommandResultReport {
        let mut outcomes = Vec::with_capacity(lockers.len());
        let mut first_err: Option<HardwareError> = None;

        for (index, &locker) in lockers.iter().enumerate() {
            if index > 0 {
                sleep(gap).await;
            }
            match self.open_one(locker, false).await {
                Ok(()) => outcomes.push(LockerOutcome {
                    locker_id: locker,
                    success: true,
                    error_message: None,
                }),
                Err(err) => {
                    tracing::warn!(
                        command = %descriptor.id,
                        locker = locker.as_u16(),
                        error = %err,
                        "bulk open: locker failed, continuing"
                    );
                    outcomes.push(LockerOutcome {
                        locker_id: locker,
                        success: false,
                        error_message: Some(err.to_string()),
                    });
                    first_err.get_or_insert(err);
                }
            }
        }

        let mut report = match first_err {
            None => self.success(),
            Some(err) => self.failure(&err),
        };
        report.locker_results = outcomes;
        report
    }

    async fn buzz(&mut self, beeps: u8, duration_ms: Option<u64>) -> CommandResultReport {
        let Some(target) = self.options.buzzer else {
            let err = HardwareError::unmapped(0, "kiosk has no buzzer channel configured");
            return self.failure(&err);
        };
        let hold = duration_ms
            .map(Duration::from_millis)
            .unwrap_or(self.options.buzzer_pulse);

        for beep in 1..=beeps.max(1) {
            if beep > 1 {
                sleep(hold).await;
            }
            if let Err(err) = self.controller.pulse_for(target, hold).await {
                tracing::warn!(beep, error = %err, "buzzer pulse failed");
                return self.failure(&err);
            }
        }
        self.success()
    }

    fn success(&self) -> CommandResultReport {
        CommandResultReport {
            success: true,
            duration_ms: 0,
            retry_count: 1,
            error_code: None,
            error_message: None,
            locker_results: Vec::new(),
        }
    }

    fn failure(&self, err: &HardwareError) -> CommandResultReport {
        // A retryable failure means the controller burned through its
        // attempt budget; a non-retryable one failed on the first try.
        let retry_count = if err.is_retryable() {
            i64::from(self.options.max_write_attempts)
        } else {
            1
        };
        CommandResultReport {
            success: false,
            duration_ms: 0,
            retry_count,
            error_code: Some(err.kind().as_str().to_string()),
            error_message: Some(err.to_string()),
            locker_results: Vec::new(),
        }
    }
}
