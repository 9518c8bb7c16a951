//! Lockbay kiosk daemon binary.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockbay_emulator::{EmulatedRelayLink, VirtualBus};
use lockbay_hardware::{
    CoilMapper, CoilTarget, ControllerConfig, RelayController, RelayLink, SerialLinkConfig,
    SerialRelayLink,
};
use lockbay_kiosk::client::HttpServerClient;
use lockbay_kiosk::config::{DEFAULT_CONF_PATH, KioskConfig};
use lockbay_kiosk::executor::{CommandExecutor, ExecutorOptions};
use lockbay_kiosk::runner::KioskRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Provisioned identity first, then the local environment on top.
    if Path::new(DEFAULT_CONF_PATH).exists() {
        dotenvy::from_path(DEFAULT_CONF_PATH)
            .with_context(|| format!("cannot read {DEFAULT_CONF_PATH}"))?;
    }
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockbay_kiosk=info,lockbay_hardware=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = KioskConfig::from_env().context("invalid kiosk configuration")?;
    info!(
        kiosk = %config.kiosk_id,
        server = %config.server_url,
        mock = config.mock_hardware,
        "Starting lockbay kiosk daemon"
    );

    let client = HttpServerClient::new(&config.server_url).context("cannot build HTTP client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Cannot listen for shutdown signal");
        }
        shutdown_tx.send(true).ok();
    });

    if config.mock_hardware {
        let mut bus = VirtualBus::new();
        for address in 1..=config.mock_cards {
            bus.install_card(address).context("mock bus setup failed")?;
        }
        info!(cards = config.mock_cards, "Running against the emulated bus");
        run_with_link(client, EmulatedRelayLink::new(bus), config, shutdown_rx).await
    } else {
        let link = SerialRelayLink::open(&SerialLinkConfig::new(&config.serial_port))
            .with_context(|| format!("cannot open serial port {}", config.serial_port))?;
        run_with_link(client, link, config, shutdown_rx).await
    }
}

async fn run_with_link<L: RelayLink>(
    client: HttpServerClient,
    link: L,
    config: KioskConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let controller_config = ControllerConfig::default().with_pulse_hold(config.pulse_hold_ms);
    let max_write_attempts = controller_config.max_write_attempts;
    let controller = RelayController::new(link, controller_config);

    let buzzer = match (config.buzzer_slave, config.buzzer_coil) {
        (Some(slave), Some(coil)) => Some(CoilTarget { slave, coil }),
        _ => None,
    };
    let options = ExecutorOptions {
        bulk_interval: config.bulk_interval(),
        buzzer,
        buzzer_pulse: Duration::from_millis(config.buzzer_pulse_ms),
        max_write_attempts,
    };

    // The mapper stays empty until startup loads the layout.
    let executor = CommandExecutor::new(controller, CoilMapper::new(vec![], vec![]), options);
    let mut runner = KioskRunner::new(client, executor, &config);

    runner
        .startup()
        .await
        .context("startup against the coordination server failed")?;
    runner.run(shutdown).await;

    info!("Kiosk daemon stopped");
    Ok(())
}
