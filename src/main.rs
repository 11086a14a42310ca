//! dial-telemetry-bridge
//!
//! Drives USB-serial analog dials from live hardware sensor telemetry.

use dial_telemetry_bridge::bus::BusEvent;
use dial_telemetry_bridge::coordinator::{Bridge, BridgeOptions, StartOutcome};
use dial_telemetry_bridge::sensors::FileSensorProvider;
use dial_telemetry_bridge::transport::{SerialTransport, SystemPorts};
use dial_telemetry_bridge::{bus, config};

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dial_telemetry_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting dial-telemetry-bridge v{} ({})",
        env!("DIALBRIDGE_VERSION"),
        env!("DIALBRIDGE_GIT_SHA")
    );

    // Load configuration
    let config_dir = config::get_config_dir();
    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded from {}: {} mapping(s), port {}",
        config_dir.display(),
        config.mappings.len(),
        config.serial.port.as_deref().unwrap_or("auto-detect")
    );

    let bus = bus::create_bus();
    let events = bus.subscribe();

    let transport = Arc::new(SerialTransport::new(
        config.serial.settings(),
        config.serial.probe_timeout(),
    ));
    let snapshot_path = config.sensors.snapshot_path_or_default();
    tracing::info!("Reading sensor snapshots from {}", snapshot_path.display());
    let provider = Arc::new(FileSensorProvider::new(snapshot_path));

    let bridge = Bridge::new(
        transport,
        Arc::new(SystemPorts),
        provider,
        bus,
        BridgeOptions::from_config(&config),
    );

    // A signal during startup cancels the pipeline; afterwards it stops the loops
    let stop = CancellationToken::new();
    tokio::spawn(log_events(events, stop.clone()));
    tokio::spawn({
        let stop = stop.clone();
        async move {
            shutdown_signal().await;
            stop.cancel();
        }
    });

    match bridge.start(&stop).await {
        StartOutcome::Started => {
            stop.cancelled().await;
            bridge.shutdown().await;
        }
        StartOutcome::Cancelled => {
            tracing::info!("Startup cancelled");
        }
        StartOutcome::Failed(message) => {
            bridge.shutdown().await;
            anyhow::bail!(message);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Mirror bus traffic into the log until `stop` fires
async fn log_events(mut rx: broadcast::Receiver<BusEvent>, stop: CancellationToken) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            event = rx.recv() => match event {
                // Per-cycle traffic
                Ok(event) if event.is_dial_event() => tracing::trace!("bus: {:?}", event),
                // The bridge logs its own transitions
                Ok(event) if event.is_lifecycle_event() => {
                    tracing::trace!("bus: {}", event.event_type())
                }
                Ok(event) => tracing::debug!("bus: {:?}", event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event log fell behind, {} event(s) skipped", missed)
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
