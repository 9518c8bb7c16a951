//! The kiosk daemon loop.
//!
//! Startup order matters: first ask the server to fail anything left in
//! `executing` from a previous run, then fetch the zone layout for the
//! mapper, then sweep every coil off so a crash mid-pulse cannot leave
//! a latch energized. Only then does the poll loop start.
//!
//! Each poll pass fetches the pending batch and, per command, claims it
//! before touching hardware. A lost claim is a normal outcome of two
//! passes racing; the command is skipped and the winner reports it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};

use lockbay_core::wire::{CommandDescriptor, HeartbeatRequest, ZoneLayoutView};
use lockbay_core::{KioskId, SlaveAddress};
use lockbay_hardware::{CoilMapper, RelayLink};

use crate::client::{ClientResult, CommandApi};
use crate::config::KioskConfig;
use crate::executor::CommandExecutor;

/// Drives one kiosk: startup recovery, the poll loop, and heartbeats.
pub struct KioskRunner<A: CommandApi, L: RelayLink> {
    api: A,
    executor: CommandExecutor<L>,
    kiosk_id: KioskId,
    zone_label: Option<String>,
    hardware_id: Option<String>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl<A: CommandApi, L: RelayLink> KioskRunner<A, L> {
    pub fn new(api: A, executor: CommandExecutor<L>, config: &KioskConfig) -> Self {
        Self {
            api,
            executor,
            kiosk_id: config.kiosk_id.clone(),
            zone_label: config.zone_label.clone(),
            hardware_id: config.hardware_id.clone(),
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
        }
    }

    /// Recover stranded commands, load the zone layout, sweep coils off.
    ///
    /// # Errors
    /// Returns an error when the server cannot be reached; the daemon
    /// must not start executing without a layout.
    pub async fn startup(&mut self) -> ClientResult<()> {
        let recovered = self.api.recover(&self.kiosk_id).await?;
        if !recovered.is_empty() {
            tracing::warn!(
                count = recovered.len(),
                "server failed commands stranded by the previous run"
            );
        }

        let layout = self.refresh_layout().await?;
        let cards = full_inventory(&layout);
        tracing::info!(
            zones = layout.zones.len(),
            cards = cards.len(),
            "zone layout loaded, sweeping coils off"
        );
        self.executor.release_all(&cards).await;
        Ok(())
    }

    /// Fetch the zone layout and rebuild the mapper from it.
    pub async fn refresh_layout(&mut self) -> ClientResult<ZoneLayoutView> {
        let layout = self.api.zone_layout(&self.kiosk_id).await?;
        let mapper = CoilMapper::new(layout.zones.clone(), full_inventory(&layout));
        self.executor.set_mapper(mapper);
        Ok(layout)
    }

    /// One poll pass: fetch the batch, claim and execute each command.
    ///
    /// Returns how many commands this pass executed.
    pub async fn poll_once(&mut self) -> ClientResult<usize> {
        let batch = self.api.pending(&self.kiosk_id).await?;
        let mut executed = 0;
        for descriptor in batch {
            if self.handle_command(descriptor).await? {
                executed += 1;
            }
        }
        Ok(executed)
    }

    async fn handle_command(&mut self, descriptor: CommandDescriptor) -> ClientResult<bool> {
        if !self.api.claim(descriptor.id, &self.kiosk_id).await? {
            tracing::debug!(command = %descriptor.id, "claim lost, skipping");
            return Ok(false);
        }

        tracing::info!(command = %descriptor.id, kind = %descriptor.kind, "executing command");
        let report = self.executor.execute(&descriptor).await;
        if !report.success {
            tracing::warn!(
                command = %descriptor.id,
                code = report.error_code.as_deref().unwrap_or(""),
                "command failed"
            );
        }
        self.api.report(descriptor.id, &report).await?;
        Ok(true)
    }

    /// Push one heartbeat and adopt the server's poll cadence.
    pub async fn heartbeat_once(&mut self) {
        let request = HeartbeatRequest {
            kiosk_id: self.kiosk_id.clone(),
            zone: self.zone_label.clone(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            hardware_id: self.hardware_id.clone(),
        };
        match self.api.heartbeat(&request).await {
            Ok(response) => {
                let wanted = Duration::from_millis(response.poll_interval_ms);
                if wanted != self.poll_interval && !wanted.is_zero() {
                    tracing::info!(
                        poll_interval_ms = response.poll_interval_ms,
                        "server changed poll cadence"
                    );
                    self.poll_interval = wanted;
                }
            }
            Err(err) => {
                // Heartbeat loss is not fatal; commands keep flowing as
                // long as the poll endpoint answers.
                tracing::warn!(error = %err, "heartbeat failed");
            }
        }
    }

    /// Run until the shutdown signal flips or its sender drops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = sleep(self.poll_interval) => {
                    if let Err(err) = self.poll_once().await {
                        tracing::warn!(error = %err, "poll pass failed");
                    }
                }
                _ = heartbeat.tick() => {
                    self.heartbeat_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("kiosk runner stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Every card the layout references, zoned or spare, in slave-address
/// order. This is the flat list the mapper's legacy path indexes for
/// lockers no zone covers, so the ordering must match what the server
/// publishes for the same kiosk.
fn full_inventory(layout: &ZoneLayoutView) -> Vec<SlaveAddress> {
    let mut cards: Vec<SlaveAddress> = layout
        .zones
        .iter()
        .flat_map(|zone| zone.relay_cards.iter().copied())
        .chain(layout.spare_cards.iter().copied())
        .collect();
    cards.sort_by_key(SlaveAddress::as_u8);
    cards.dedup();
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use uuid::Uuid;

    use lockbay_core::wire::{CommandResultReport, HeartbeatResponse};
    use lockbay_core::zone::{LockerRange, Zone};
    use lockbay_core::{CommandId, CommandPayload, KioskStatus, LockerId};
    use lockbay_emulator::{EmulatedRelayLink, VirtualBus};
    use lockbay_hardware::{ControllerConfig, RelayController};

    use crate::client::ClientError;
    use crate::executor::ExecutorOptions;

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    fn test_layout() -> ZoneLayoutView {
        ZoneLayoutView {
            zones: vec![Zone {
                name: "mens".to_string(),
                ranges: vec![LockerRange::new(1, 32).unwrap()],
                relay_cards: vec![slave(1), slave(2)],
                enabled: true,
            }],
            spare_cards: vec![slave(3)],
        }
    }

    fn open_command(locker: u16) -> CommandDescriptor {
        let payload = CommandPayload::Open {
            locker_id: LockerId::new(locker).unwrap(),
            burst: false,
        };
        CommandDescriptor {
            id: Uuid::new_v4(),
            kind: payload.kind(),
            payload,
            created_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct StubApi {
        pending: Mutex<Vec<CommandDescriptor>>,
        denied_claims: HashSet<CommandId>,
        claims: Mutex<Vec<CommandId>>,
        reports: Mutex<Vec<(CommandId, CommandResultReport)>>,
        recover_calls: Mutex<u32>,
        recovered: Vec<CommandId>,
        heartbeat_poll_ms: u64,
    }

    impl StubApi {
        fn new() -> Self {
            Self {
                heartbeat_poll_ms: 1000,
                ..Self::default()
            }
        }
    }

    impl CommandApi for StubApi {
        async fn heartbeat(&self, _request: &HeartbeatRequest) -> ClientResult<HeartbeatResponse> {
            Ok(HeartbeatResponse {
                status: KioskStatus::Online,
                poll_interval_ms: self.heartbeat_poll_ms,
            })
        }

        async fn pending(&self, _kiosk: &KioskId) -> ClientResult<Vec<CommandDescriptor>> {
            Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
        }

        async fn claim(&self, id: CommandId, _kiosk: &KioskId) -> ClientResult<bool> {
            if self.denied_claims.contains(&id) {
                return Ok(false);
            }
            self.claims.lock().unwrap().push(id);
            Ok(true)
        }

        async fn report(&self, id: CommandId, report: &CommandResultReport) -> ClientResult<()> {
            self.reports.lock().unwrap().push((id, report.clone()));
            Ok(())
        }

        async fn recover(&self, _kiosk: &KioskId) -> ClientResult<Vec<CommandId>> {
            *self.recover_calls.lock().unwrap() += 1;
            Ok(self.recovered.clone())
        }

        async fn zone_layout(&self, _kiosk: &KioskId) -> ClientResult<ZoneLayoutView> {
            Ok(test_layout())
        }
    }

    fn test_config() -> KioskConfig {
        KioskConfig {
            kiosk_id: "kiosk-01".parse().unwrap(),
            server_url: "http://127.0.0.1:8080".into(),
            serial_port: "/dev/ttyUSB0".into(),
            zone_label: Some("mens".into()),
            hardware_id: None,
            pulse_hold_ms: 400,
            bulk_interval_ms: 300,
            poll_interval_ms: 1000,
            heartbeat_interval_secs: 30,
            buzzer_slave: None,
            buzzer_coil: None,
            buzzer_pulse_ms: 200,
            mock_hardware: true,
            mock_cards: 3,
        }
    }

    fn runner_with(
        api: StubApi,
        bus: VirtualBus,
    ) -> (
        KioskRunner<StubApi, EmulatedRelayLink>,
        std::sync::Arc<tokio::sync::Mutex<VirtualBus>>,
    ) {
        let link = EmulatedRelayLink::new(bus);
        let handle = link.bus();
        let controller = RelayController::new(link, ControllerConfig::default());
        // Empty mapper until startup loads the layout.
        let mapper = CoilMapper::new(vec![], vec![]);
        let executor = CommandExecutor::new(
            controller,
            mapper,
            ExecutorOptions {
                bulk_interval: Duration::from_millis(300),
                buzzer: None,
                buzzer_pulse: Duration::from_millis(200),
                max_write_attempts: 3,
            },
        );
        (KioskRunner::new(api, executor, &test_config()), handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_recovers_then_sweeps_all_cards() {
        let bus = VirtualBus::builder().card(1).card(2).card(3).build().unwrap();
        let (mut runner, handle) = runner_with(StubApi::new(), bus);
        handle.lock().await.set_coil(2, 5, true).unwrap();

        runner.startup().await.unwrap();

        assert_eq!(*runner.api.recover_calls.lock().unwrap(), 1);
        let bus = handle.lock().await;
        assert_eq!(bus.coil(2, 5), Some(false));
        // One multi-coil release frame per card, spare included.
        assert_eq!(bus.frames_received(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_claims_executes_and_reports() {
        let api = StubApi::new();
        let command = open_command(18);
        let command_id = command.id;
        api.pending.lock().unwrap().push(command);

        let bus = VirtualBus::builder().card(1).card(2).card(3).build().unwrap();
        let (mut runner, handle) = runner_with(api, bus);
        runner.refresh_layout().await.unwrap();

        let executed = runner.poll_once().await.unwrap();
        assert_eq!(executed, 1);

        assert_eq!(*runner.api.claims.lock().unwrap(), vec![command_id]);
        let reports = runner.api.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, command_id);
        assert!(reports[0].1.success);
        drop(reports);

        // Locker 18: card 2, channel 2, pulsed and released.
        let bus = handle.lock().await;
        assert_eq!(bus.frames_received(), 2);
        assert_eq!(bus.coil(2, 2), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_claim_skips_hardware_and_report() {
        let mut api = StubApi::new();
        let command = open_command(5);
        api.denied_claims.insert(command.id);
        api.pending.lock().unwrap().push(command);

        let bus = VirtualBus::builder().card(1).card(2).build().unwrap();
        let (mut runner, handle) = runner_with(api, bus);
        runner.refresh_layout().await.unwrap();

        let executed = runner.poll_once().await.unwrap();
        assert_eq!(executed, 0);
        assert!(runner.api.reports.lock().unwrap().is_empty());
        assert_eq!(handle.lock().await.frames_received(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_still_reports() {
        let api = StubApi::new();
        // Locker 40 is outside the layout: no zone, inventory too short.
        let command = open_command(40);
        api.pending.lock().unwrap().push(command);

        let bus = VirtualBus::builder().card(1).card(2).card(3).build().unwrap();
        let (mut runner, _) = runner_with(api, bus);
        runner.refresh_layout().await.unwrap();

        runner.poll_once().await.unwrap();

        let reports = runner.api.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].1.success);
        assert_eq!(reports[0].1.error_code.as_deref(), Some("INVALID_COIL"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_adopts_server_poll_cadence() {
        let mut api = StubApi::new();
        api.heartbeat_poll_ms = 250;

        let bus = VirtualBus::builder().card(1).build().unwrap();
        let (mut runner, _) = runner_with(api, bus);
        assert_eq!(runner.poll_interval, Duration::from_millis(1000));

        runner.heartbeat_once().await;
        assert_eq!(runner.poll_interval, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_signal() {
        let bus = VirtualBus::builder().card(1).build().unwrap();
        let (runner, _) = runner_with(StubApi::new(), bus);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(runner.run(rx));

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_full_inventory_is_in_slave_address_order() {
        let cards = full_inventory(&test_layout());
        assert_eq!(cards, vec![slave(1), slave(2), slave(3)]);
    }

    // A zone may list its cards in any order; the flat inventory must
    // still come out sorted, with cards shared between a zone and the
    // spare list counted once.
    #[test]
    fn test_full_inventory_sorts_out_of_order_zone_cards() {
        let layout = ZoneLayoutView {
            zones: vec![Zone {
                name: "mens".to_string(),
                ranges: vec![LockerRange::new(1, 32).unwrap()],
                relay_cards: vec![slave(3), slave(1)],
                enabled: true,
            }],
            spare_cards: vec![slave(2), slave(3)],
        };
        assert_eq!(full_inventory(&layout), vec![slave(1), slave(2), slave(3)]);
    }

    // Keeps the stub honest about the error type's ergonomics.
    #[test]
    fn test_client_error_display() {
        let err = ClientError::Rejected {
            status: reqwest::StatusCode::CONFLICT,
            body: "{\"code\":\"NOT_CLAIMABLE\"}".to_string(),
        };
        assert!(err.to_string().contains("409"));
    }
}
