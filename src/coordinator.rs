//! Bridge - startup pipeline and lifecycle for the dial bridge
//!
//! Owns the transport, dial controller, sensor hub and monitor engine.
//! `start` walks the initialization steps (connect, discover, provider,
//! first mapping writes) and then spawns the two long-running loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BridgeStatus, BusEvent, SharedBus};
use crate::config::Config;
use crate::dials::{DialController, DialStore};
use crate::monitor::{MonitorConfig, MonitorEngine};
use crate::sensors::{ConnectOutcome, HubConfig, SensorHub, SensorProvider};
use crate::transport::{PortConnector, SerialTransport};

/// Result of [`Bridge::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    Cancelled,
    Failed(String),
}

/// Startup settings taken from [`Config`]
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Explicit serial port; auto-detect when unset
    pub port: Option<String>,
    pub hub: HubConfig,
    pub monitor: MonitorConfig,
    /// How long shutdown waits for each task to finish
    pub shutdown_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            port: None,
            hub: HubConfig::default(),
            monitor: MonitorConfig::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl BridgeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.serial.port.clone(),
            hub: config.sensors.hub_config(),
            monitor: config.monitor_config(),
            ..Self::default()
        }
    }
}

pub struct Bridge {
    transport: Arc<SerialTransport>,
    connector: Arc<dyn PortConnector>,
    controller: DialController,
    hub: Arc<SensorHub>,
    engine: Arc<MonitorEngine>,
    bus: SharedBus,
    port: Option<String>,
    status: RwLock<(BridgeStatus, String)>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    /// Parent of every task token
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl Bridge {
    pub fn new(
        transport: Arc<SerialTransport>,
        connector: Arc<dyn PortConnector>,
        provider: Arc<dyn SensorProvider>,
        bus: SharedBus,
        options: BridgeOptions,
    ) -> Self {
        let controller = DialController::new(transport.clone(), DialStore::new(), bus.clone());
        let hub = Arc::new(SensorHub::new(provider, bus.clone(), options.hub));
        let engine = Arc::new(MonitorEngine::new(
            options.monitor,
            Arc::new(controller.clone()),
            hub.clone(),
            bus.clone(),
        ));

        Self {
            transport,
            connector,
            controller,
            hub,
            engine,
            bus,
            port: options.port,
            status: RwLock::new((BridgeStatus::Idle, String::new())),
            tasks: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            shutdown_timeout: options.shutdown_timeout,
        }
    }

    pub fn controller(&self) -> &DialController {
        &self.controller
    }

    pub fn engine(&self) -> &Arc<MonitorEngine> {
        &self.engine
    }

    pub fn hub(&self) -> &Arc<SensorHub> {
        &self.hub
    }

    pub async fn status(&self) -> (BridgeStatus, String) {
        self.status.read().await.clone()
    }

    async fn set_status(&self, status: BridgeStatus, message: impl Into<String>) {
        let message = message.into();
        {
            let mut current = self.status.write().await;
            *current = (status, message.clone());
        }
        info!("Bridge {}: {}", status, message);
        self.bus.publish(BusEvent::StatusChanged { status, message });
    }

    /// Run the startup pipeline and spawn the monitoring loops.
    ///
    /// Every step observes `cancel`. On cancellation the transport is
    /// disconnected, device records are dropped and monitoring state is left
    /// as it was.
    pub async fn start(&self, cancel: &CancellationToken) -> StartOutcome {
        if !self.tasks.lock().await.is_empty() {
            debug!("Bridge already running");
            return StartOutcome::Started;
        }

        // 1. Serial connection
        self.set_status(BridgeStatus::Connecting, "Searching for dial hub")
            .await;
        let connect = self
            .transport
            .connect(self.connector.as_ref(), self.port.as_deref());
        let port = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort().await,
            result = connect => match result {
                Ok(port) => port,
                Err(e) => return self.fail(format!("Hub connection failed: {}", e)).await,
            },
        };

        // 2. Dial discovery
        self.set_status(
            BridgeStatus::Initializing,
            format!("Discovering dials on {}", port),
        )
        .await;
        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort().await,
            result = self.controller.try_discover() => match result {
                Ok(uids) => uids,
                Err(e) => return self.fail(format!("Dial discovery failed: {}", e)).await,
            },
        };
        if discovered.is_empty() {
            warn!("No dials found on {}; mapped dials will report errors", port);
        } else {
            info!("Discovered {} dial(s)", discovered.len());
        }

        // 3. Sensor provider
        self.set_status(
            BridgeStatus::ConnectingProvider,
            format!("Connecting to sensor provider {}", self.hub.provider_name()),
        )
        .await;
        let provider_up = match self.hub.connect_with_retry(cancel).await {
            ConnectOutcome::Connected => true,
            ConnectOutcome::Cancelled => return self.abort().await,
            ConnectOutcome::Exhausted => false,
        };
        if provider_up {
            // Seed the snapshot so the first writes have data
            if let Err(e) = self.hub.poll_once().await {
                warn!("Initial sensor poll failed: {:#}", e);
            }
        }

        // 4. Initial mapping writes
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort().await,
            report = self.engine.initialize_pending() => report,
        };
        debug!("Initial dial writes: {:?}", report);

        // 5. Long-running loops
        {
            let mut tasks = self.tasks.lock().await;
            if provider_up {
                tasks.push((
                    "sensor_hub",
                    tokio::spawn(self.hub.clone().run(self.shutdown.child_token())),
                ));
            }
            tasks.push((
                "monitor",
                tokio::spawn(self.engine.clone().run(self.shutdown.child_token())),
            ));
        }

        let dials = self.engine.active_dials().await.len();
        let message = if provider_up {
            format!("Monitoring {} dial(s)", dials)
        } else {
            format!(
                "Monitoring {} dial(s) without sensor data (provider unavailable)",
                dials
            )
        };
        self.set_status(BridgeStatus::Monitoring, message).await;
        StartOutcome::Started
    }

    async fn abort(&self) -> StartOutcome {
        self.transport.disconnect().await;
        self.controller.store().clear().await;
        self.set_status(BridgeStatus::Idle, "Startup cancelled").await;
        StartOutcome::Cancelled
    }

    async fn fail(&self, message: String) -> StartOutcome {
        error!("{}", message);
        self.set_status(BridgeStatus::Failed, message.clone()).await;
        StartOutcome::Failed(message)
    }

    /// Re-run dial discovery on the open connection.
    pub async fn rediscover(&self) -> bool {
        self.controller.discover().await
    }

    /// Swap the monitor's mappings and timing.
    pub async fn update_monitor(&self, config: MonitorConfig) {
        self.engine.replace_config(config).await;
    }

    pub async fn is_running(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }

    /// Stop both loops, wait for them to finish, close the hub connection and
    /// forget the device records.
    pub async fn shutdown(&self) {
        info!("Bridge shutting down");
        self.bus.publish(BusEvent::ShuttingDown {
            reason: Some("Bridge shutdown".to_string()),
        });
        self.shutdown.cancel();

        // Release lock before awaiting
        let handles: Vec<(&'static str, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };

        for (name, handle) in handles {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => debug!("Task {} joined", name),
                Ok(Err(e)) => warn!("Task {} panicked: {}", name, e),
                Err(_) => warn!("Task {} did not stop within timeout, abandoning", name),
            }
        }

        self.transport.disconnect().await;
        self.controller.store().clear().await;
        self.set_status(BridgeStatus::Idle, "Stopped").await;
        info!("Bridge shutdown complete");
    }
}
