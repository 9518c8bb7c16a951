//! Serial transport for the relay bus.
//!
//! RTU framing has no delimiters; a transaction is "write one frame,
//! then read until the expected number of bytes arrived or the slave
//! stayed silent too long". [`RelayLink`] captures exactly that one
//! operation, so the controller logic can run against the real RS-485
//! adapter or an in-process board.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024
//! RPITIT), eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, sleep, timeout};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};

use lockbay_modbus::frame::{DEFAULT_BAUD_RATE, EXCEPTION_FRAME_LEN};

use crate::error::{HardwareError, Result};

/// Time a slave gets to start and finish its reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);

/// Bus silence between frames. 3.5 character times at 9600 baud.
pub const DEFAULT_INTER_FRAME_GAP: Duration = Duration::from_millis(4);

/// One request-reply exchange on the relay bus.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods
/// return `impl Future` (Edition 2024 RPITIT). Use generic type
/// parameters, as [`RelayController`](crate::controller::RelayController)
/// does.
pub trait RelayLink: Send + Sync {
    /// Send a request frame and collect the reply.
    ///
    /// `expected_len` is the length of a successful reply; an exception
    /// reply is shorter and must also be returned intact, so the caller
    /// can decode the rejection.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails, the link drops, or the slave
    /// stays silent past the response deadline.
    async fn transact(&mut self, request: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// Configuration for a serial relay link.
#[derive(Debug, Clone)]
pub struct SerialLinkConfig {
    /// Device node of the RS-485 adapter, e.g. `/dev/ttyUSB0`.
    pub port: String,
    pub baud_rate: u32,
    pub response_timeout: Duration,
    pub inter_frame_gap: Duration,
}

impl SerialLinkConfig {
    /// Configuration with the card's factory serial parameters.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            inter_frame_gap: DEFAULT_INTER_FRAME_GAP,
        }
    }
}

/// [`RelayLink`] over a real RS-485 serial adapter.
///
/// The port is opened exclusively; a second process opening the same
/// device node fails instead of interleaving frames on the bus.
pub struct SerialRelayLink {
    port: SerialStream,
    port_name: String,
    response_timeout: Duration,
    inter_frame_gap: Duration,
    last_activity: Instant,
}

impl SerialRelayLink {
    /// Open the serial device in 8N1 framing with exclusive access.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::PortUnavailable`] if the device node
    /// cannot be opened or exclusivity cannot be acquired.
    pub fn open(config: &SerialLinkConfig) -> Result<Self> {
        let mut port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.response_timeout)
            .open_native_async()
            .map_err(|err| HardwareError::port_unavailable(&config.port, err.to_string()))?;
        port.set_exclusive(true)
            .map_err(|err| HardwareError::port_unavailable(&config.port, err.to_string()))?;

        tracing::info!(
            port = %config.port,
            baud = config.baud_rate,
            "serial relay link opened"
        );

        Ok(Self {
            port,
            port_name: config.port.clone(),
            response_timeout: config.response_timeout,
            inter_frame_gap: config.inter_frame_gap,
            last_activity: Instant::now(),
        })
    }
}

impl RelayLink for SerialRelayLink {
    async fn transact(&mut self, request: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let slave = request.first().copied().unwrap_or(0);

        // Respect the inter-frame silence the cards need to re-arm.
        let since_last = self.last_activity.elapsed();
        if since_last < self.inter_frame_gap {
            sleep(self.inter_frame_gap - since_last).await;
        }

        // Drop bytes left over from a timed-out exchange so they cannot
        // be mistaken for the reply to this request.
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|err| HardwareError::link_lost(err.to_string()))?;

        tracing::trace!(port = %self.port_name, slave, len = request.len(), "tx frame");
        self.port.write_all(request).await?;
        self.port.flush().await?;
        self.last_activity = Instant::now();

        let deadline = Instant::now() + self.response_timeout;
        let mut reply: Vec<u8> = Vec::with_capacity(expected_len);
        let mut chunk = [0u8; 64];

        loop {
            // An exception reply announces itself in the function byte
            // and is always five bytes.
            let want = if reply.len() >= 2 && reply[1] & 0x80 != 0 {
                EXCEPTION_FRAME_LEN
            } else {
                expected_len
            };
            if reply.len() >= want {
                reply.truncate(want);
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HardwareError::timeout(
                    slave,
                    self.response_timeout.as_millis() as u64,
                ));
            }

            match timeout(remaining, self.port.read(&mut chunk)).await {
                Err(_) => {
                    return Err(HardwareError::timeout(
                        slave,
                        self.response_timeout.as_millis() as u64,
                    ));
                }
                Ok(Ok(0)) => return Err(HardwareError::link_lost("serial port closed")),
                Ok(Ok(n)) => reply.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) => return Err(err.into()),
            }
        }

        self.last_activity = Instant::now();
        tracing::trace!(port = %self.port_name, slave, len = reply.len(), "rx frame");
        Ok(reply)
    }
}
