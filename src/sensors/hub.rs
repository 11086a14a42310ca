//! SensorHub - owns the sensor provider and its reconnect policy
//!
//! Polls the provider on a fixed interval into a shared snapshot. When the
//! provider drops, the hub retries a bounded number of times; once the
//! attempts are exhausted it stops polling and the snapshot stays empty, so
//! the monitor keeps running on its cached readings.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ReadingSource, SensorProvider, SensorReading};
use crate::bus::{BusEvent, SharedBus};

/// Polling and reconnect settings
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub poll_interval: Duration,
    /// Connect attempts per reconnect cycle
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reconnect_attempts: 300,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Result of a bounded connect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Exhausted,
    Cancelled,
}

pub struct SensorHub {
    provider: Arc<dyn SensorProvider>,
    bus: SharedBus,
    config: HubConfig,
    snapshot: RwLock<Vec<SensorReading>>,
    connected: AtomicBool,
}

impl SensorHub {
    pub fn new(provider: Arc<dyn SensorProvider>, bus: SharedBus, config: HubConfig) -> Self {
        Self {
            provider,
            bus,
            config,
            snapshot: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn snapshot(&self) -> Vec<SensorReading> {
        self.snapshot.read().await.clone()
    }

    /// Record a connectivity change and publish it if the state flipped.
    async fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if !connected {
            self.snapshot.write().await.clear();
        }
        if previous != connected {
            info!(
                "Sensor provider {} {}",
                self.provider.name(),
                if connected { "connected" } else { "disconnected" }
            );
            self.bus.publish(BusEvent::ProviderConnectionChanged {
                provider: self.provider.name().to_string(),
                connected,
            });
        }
    }

    /// Try to connect up to `reconnect_attempts` times, spaced by
    /// `reconnect_delay`. Cancellation ends the cycle immediately.
    pub async fn connect_with_retry(&self, cancel: &CancellationToken) -> ConnectOutcome {
        let attempts = self.config.reconnect_attempts.max(1);
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return ConnectOutcome::Cancelled;
            }

            match self.provider.connect().await {
                Ok(()) => {
                    self.set_connected(true).await;
                    return ConnectOutcome::Connected;
                }
                Err(e) => {
                    if attempt == 1 || attempt % 30 == 0 {
                        warn!(
                            "{}: connect attempt {}/{} failed: {:#}",
                            self.provider.name(),
                            attempt,
                            attempts,
                            e
                        );
                    } else {
                        debug!("{}: connect attempt {} failed: {:#}", self.provider.name(), attempt, e);
                    }
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return ConnectOutcome::Cancelled,
                    _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                }
            }
        }
        warn!(
            "{}: giving up after {} connect attempts, continuing without sensor data",
            self.provider.name(),
            attempts
        );
        ConnectOutcome::Exhausted
    }

    /// Fetch one snapshot. A failure marks the provider disconnected.
    pub async fn poll_once(&self) -> anyhow::Result<usize> {
        match self.provider.readings().await {
            Ok(readings) => {
                let count = readings.len();
                *self.snapshot.write().await = readings;
                Ok(count)
            }
            Err(e) => {
                self.set_connected(false).await;
                Err(e)
            }
        }
    }

    /// Poll until cancelled or until reconnecting is exhausted.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let name = self.provider.name();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break "cancelled",
                _ = ticker.tick() => {}
            }

            if !self.connected.load(Ordering::SeqCst) {
                match self.connect_with_retry(&cancel).await {
                    ConnectOutcome::Connected => {}
                    ConnectOutcome::Cancelled => break "cancelled",
                    ConnectOutcome::Exhausted => break "reconnect attempts exhausted",
                }
            }

            match self.poll_once().await {
                Ok(count) => debug!("{}: {} readings", name, count),
                Err(e) => warn!("{}: poll failed: {:#}", name, e),
            }
        };

        self.provider.disconnect().await;
        self.set_connected(false).await;
        info!("Sensor hub stopped: {}", reason);
        self.bus.publish(BusEvent::TaskStopped {
            task: "sensor_hub".to_string(),
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl ReadingSource for SensorHub {
    async fn current_readings(&self) -> Vec<SensorReading> {
        self.snapshot().await
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::create_bus;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Provider that fails to connect `fail_connects` times and serves
    /// scripted readings batches.
    struct Scripted {
        fail_connects: AtomicU32,
        connect_calls: AtomicU32,
        batches: Mutex<Vec<Result<Vec<SensorReading>, String>>>,
    }

    impl Scripted {
        fn new(fail_connects: u32, batches: Vec<Result<Vec<SensorReading>, String>>) -> Self {
            Self {
                fail_connects: AtomicU32::new(fail_connects),
                connect_calls: AtomicU32::new(0),
                batches: Mutex::new(batches),
            }
        }
    }

    #[async_trait]
    impl SensorProvider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn connect(&self) -> Result<()> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_connects.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_connects.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow!("provider not running"));
            }
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn is_connected(&self) -> bool {
            true
        }

        async fn readings(&self) -> Result<Vec<SensorReading>> {
            let next = {
                let mut batches = self.batches.lock().unwrap();
                if batches.is_empty() {
                    Ok(Vec::new())
                } else {
                    batches.remove(0)
                }
            };
            next.map_err(|e| anyhow!(e))
        }
    }

    fn reading(value: f64) -> SensorReading {
        SensorReading {
            sensor_id: 1,
            sensor_instance: 0,
            sensor_name: "CPU".to_string(),
            entry_id: 1,
            entry_name: "Package".to_string(),
            value,
            unit: "°C".to_string(),
            category: crate::sensors::SensorCategory::Temperature,
        }
    }

    fn fast_config(attempts: u32) -> HubConfig {
        HubConfig {
            poll_interval: Duration::from_millis(10),
            reconnect_attempts: attempts,
            reconnect_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_connect_retries_until_success() {
        let provider = Arc::new(Scripted::new(2, vec![]));
        let bus = create_bus();
        let mut rx = bus.subscribe();
        let hub = SensorHub::new(provider.clone(), bus, fast_config(5));

        let outcome = hub.connect_with_retry(&CancellationToken::new()).await;
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert_eq!(provider.connect_calls.load(Ordering::SeqCst), 3);
        assert!(ReadingSource::is_connected(&hub).await);

        match rx.recv().await.unwrap() {
            BusEvent::ProviderConnectionChanged { provider, connected } => {
                assert_eq!(provider, "scripted");
                assert!(connected);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_exhausts() {
        let provider = Arc::new(Scripted::new(10, vec![]));
        let hub = SensorHub::new(provider.clone(), create_bus(), fast_config(3));
        let outcome = hub.connect_with_retry(&CancellationToken::new()).await;
        assert_eq!(outcome, ConnectOutcome::Exhausted);
        assert_eq!(provider.connect_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_cancelled_during_backoff() {
        let provider = Arc::new(Scripted::new(u32::MAX, vec![]));
        let config = HubConfig {
            reconnect_delay: Duration::from_secs(60),
            ..fast_config(300)
        };
        let hub = SensorHub::new(provider, create_bus(), config);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), hub.connect_with_retry(&cancel))
            .await
            .unwrap();
        assert_eq!(outcome, ConnectOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_poll_failure_clears_snapshot() {
        let provider = Arc::new(Scripted::new(
            0,
            vec![Ok(vec![reading(40.0)]), Err("exporter gone".to_string())],
        ));
        let hub = SensorHub::new(provider, create_bus(), fast_config(1));
        hub.connect_with_retry(&CancellationToken::new()).await;

        assert_eq!(hub.poll_once().await.unwrap(), 1);
        assert_eq!(hub.current_readings().await, vec![reading(40.0)]);

        assert!(hub.poll_once().await.is_err());
        assert!(hub.current_readings().await.is_empty());
        assert!(!ReadingSource::is_connected(&hub).await);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let provider = Arc::new(Scripted::new(0, vec![Ok(vec![reading(50.0)])]));
        let bus = create_bus();
        let mut rx = bus.subscribe();
        let hub = Arc::new(SensorHub::new(provider, bus, fast_config(1)));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(hub.clone().run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let mut stopped = false;
        while let Ok(event) = rx.try_recv() {
            if let BusEvent::TaskStopped { task, reason } = event {
                assert_eq!(task, "sensor_hub");
                assert_eq!(reason, "cancelled");
                stopped = true;
            }
        }
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_run_ends_when_reconnect_exhausted() {
        let provider = Arc::new(Scripted::new(u32::MAX, vec![]));
        let hub = Arc::new(SensorHub::new(provider, create_bus(), fast_config(2)));
        tokio::time::timeout(Duration::from_secs(1), hub.clone().run(CancellationToken::new()))
            .await
            .unwrap();
        assert!(hub.snapshot().await.is_empty());
    }
}
