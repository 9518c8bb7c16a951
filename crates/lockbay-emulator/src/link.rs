//! In-process stand-in for the serial transport.
//!
//! [`EmulatedRelayLink`] satisfies the same [`RelayLink`] contract as
//! the RS-485 adapter, so the controller and the kiosk daemon run
//! unmodified against a [`VirtualBus`]. Bus silence becomes the same
//! response timeout the serial transport reports, which keeps retry and
//! failure handling on the exact paths they take with real hardware.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;

use lockbay_hardware::transport::DEFAULT_RESPONSE_TIMEOUT;
use lockbay_hardware::{HardwareError, RelayLink, Result};

use crate::board::VirtualBus;

/// [`RelayLink`] backed by a [`VirtualBus`] instead of a serial port.
pub struct EmulatedRelayLink {
    bus: Arc<Mutex<VirtualBus>>,
    latency: Duration,
    reported_timeout_ms: u64,
}

impl EmulatedRelayLink {
    /// Wrap a bus, taking over its traffic.
    #[must_use]
    pub fn new(bus: VirtualBus) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
            latency: Duration::ZERO,
            reported_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
        }
    }

    /// Add a fixed round-trip delay to every transaction.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Shared handle to the bus behind the link.
    ///
    /// Lets a test or a development console script faults and inspect
    /// coil state while the link keeps serving the controller.
    #[must_use]
    pub fn bus(&self) -> Arc<Mutex<VirtualBus>> {
        Arc::clone(&self.bus)
    }
}

impl RelayLink for EmulatedRelayLink {
    async fn transact(&mut self, request: &[u8], _expected_len: usize) -> Result<Vec<u8>> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let reply = self.bus.lock().await.process_frame(request);
        match reply {
            Some(frame) => Ok(frame.to_vec()),
            None => Err(HardwareError::timeout(
                request.first().copied().unwrap_or(0),
                self.reported_timeout_ms,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbay_core::{CoilAddress, SlaveAddress};
    use lockbay_hardware::{CoilTarget, ControllerConfig, RelayController};
    use lockbay_modbus::request;

    fn slave(addr: u8) -> SlaveAddress {
        SlaveAddress::new(addr).unwrap()
    }

    fn target(card: u8, channel: u8) -> CoilTarget {
        CoilTarget {
            slave: slave(card),
            coil: CoilAddress::new(channel).unwrap(),
        }
    }

    fn link_with_card(address: u8) -> EmulatedRelayLink {
        let bus = VirtualBus::builder().card(address).build().unwrap();
        EmulatedRelayLink::new(bus)
    }

    #[tokio::test]
    async fn test_transact_returns_card_reply() {
        let mut link = link_with_card(1);
        let frame = request::write_single_coil(slave(1), 0, true);

        let reply = link.transact(&frame, frame.len()).await.unwrap();
        assert_eq!(reply, frame.to_vec());
    }

    #[tokio::test]
    async fn test_silence_surfaces_as_timeout() {
        let mut link = link_with_card(1);
        let frame = request::write_single_coil(slave(9), 0, true);

        let err = link.transact(&frame, frame.len()).await.unwrap_err();
        assert!(matches!(
            err,
            HardwareError::ResponseTimeout { slave: 9, .. }
        ));
    }

    #[tokio::test]
    async fn test_bus_handle_sees_state_changes() {
        let mut link = link_with_card(1);
        let bus = link.bus();
        let frame = request::write_single_coil(slave(1), 2, true);

        link.transact(&frame, frame.len()).await.unwrap();
        assert_eq!(bus.lock().await.coil(1, 3), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_the_reply() {
        let mut link = link_with_card(1).with_latency(Duration::from_millis(50));
        let frame = request::write_single_coil(slave(1), 0, true);

        let before = tokio::time::Instant::now();
        link.transact(&frame, frame.len()).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_pulse_over_emulated_bus() {
        let link = link_with_card(2);
        let bus = link.bus();
        let mut controller = RelayController::new(link, ControllerConfig::default());

        controller.pulse(target(2, 7)).await.unwrap();

        let bus = bus.lock().await;
        // Energize plus release, relay back at rest.
        assert_eq!(bus.frames_received(), 2);
        assert_eq!(bus.coil(2, 7), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_demotes_on_legacy_card() {
        let bus = VirtualBus::builder().legacy_card(1).build().unwrap();
        let link = EmulatedRelayLink::new(bus);
        let handle = link.bus();
        let mut controller = RelayController::new(link, ControllerConfig::default());

        controller.set_coil(target(1, 1), true).await.unwrap();

        let bus = handle.lock().await;
        // The rejected multi-coil frame, then the single-coil fallback.
        assert_eq!(bus.frames_received(), 2);
        assert_eq!(bus.coil(1, 1), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_retries_through_dropped_reply() {
        let link = link_with_card(1);
        let handle = link.bus();
        handle.lock().await.drop_next_replies(1);
        let mut controller = RelayController::new(link, ControllerConfig::default());

        controller.set_coil(target(1, 4), true).await.unwrap();

        let bus = handle.lock().await;
        assert_eq!(bus.frames_received(), 2);
        assert_eq!(bus.coil(1, 4), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_detects_stuck_relay() {
        let link = link_with_card(1);
        let handle = link.bus();
        handle.lock().await.stick_channel(1, 5).unwrap();
        let config = ControllerConfig {
            verify_writes: true,
            max_write_attempts: 2,
            ..ControllerConfig::default()
        };
        let mut controller = RelayController::new(link, config);

        let err = controller.set_coil(target(1, 5), true).await.unwrap_err();
        assert!(matches!(
            err,
            HardwareError::VerificationFailed { slave: 1, coil: 4 }
        ));
        // Two write attempts, each followed by a read-back.
        assert_eq!(handle.lock().await.frames_received(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_scan_finds_installed_cards() {
        let bus = VirtualBus::builder().card(1).card(3).build().unwrap();
        let link = EmulatedRelayLink::new(bus);
        let mut controller = RelayController::new(link, ControllerConfig::default());

        let found = controller.scan_bus(1..=4).await.unwrap();
        assert_eq!(found, vec![slave(1), slave(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_reassigns_card_address() {
        let link = link_with_card(1);
        let handle = link.bus();
        let mut controller = RelayController::new(link, ControllerConfig::default());

        controller
            .assign_slave_address(slave(1), slave(6))
            .await
            .unwrap();

        assert_eq!(handle.lock().await.card_addresses(), vec![6]);
        assert_eq!(controller.read_slave_address(slave(6)).await.unwrap(), 6);
    }
}
