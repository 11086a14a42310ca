//! MonitorEngine - turns sensor readings into dial writes
//!
//! One coarse mutex guards the mapping configuration and per-dial state. It
//! is taken to plan a cycle and again to record results, never across device
//! I/O; the transport serializes the writes themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::mapping::{DialColor, MappingError, SensorMapping};
use crate::bus::{BusEvent, SharedBus};
use crate::dials::{DialController, DialError, DialUid};
use crate::sensors::{ReadingSource, SensorReading};

/// The hub drives at most four dials
pub const MAX_DIALS: usize = 4;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Sink for computed dial updates.
#[async_trait]
pub trait DialWriter: Send + Sync {
    async fn write_position(&self, uid: &DialUid, percent: u8) -> Result<(), DialError>;

    async fn write_color(&self, uid: &DialUid, color: DialColor) -> Result<(), DialError>;
}

#[async_trait]
impl DialWriter for DialController {
    async fn write_position(&self, uid: &DialUid, percent: u8) -> Result<(), DialError> {
        self.set_position(uid, percent).await
    }

    async fn write_color(&self, uid: &DialUid, color: DialColor) -> Result<(), DialError> {
        self.set_backlight(uid, color.backlight()).await
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Minimum spacing between physical writes to one dial
    pub debounce: Duration,
    /// Effective dial window (capped at [`MAX_DIALS`])
    pub dial_count: usize,
    pub mappings: Vec<SensorMapping>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            dial_count: MAX_DIALS,
            mappings: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Enabled mappings inside the dial window, in configuration order.
    pub fn active_mappings(&self) -> impl Iterator<Item = &SensorMapping> {
        self.mappings
            .iter()
            .filter(|m| m.enabled)
            .take(self.dial_count.min(MAX_DIALS))
    }
}

/// Per-dial monitoring state
#[derive(Debug, Clone)]
pub struct MonitoringState {
    pub last_percentage: Option<u8>,
    pub last_color: Option<DialColor>,
    pub last_reading: Option<SensorReading>,
    pub last_update: Option<DateTime<Utc>>,
    /// Time of the last physical write (debounce reference)
    pub last_write: Option<Instant>,
    pub update_count: u64,
    /// Set until the on-entry initialization write succeeds
    pub pending_init: bool,
}

impl MonitoringState {
    fn fresh() -> Self {
        Self {
            last_percentage: None,
            last_color: None,
            last_reading: None,
            last_update: None,
            last_write: None,
            update_count: 0,
            pending_init: true,
        }
    }
}

struct EngineState {
    config: MonitorConfig,
    dials: HashMap<DialUid, MonitoringState>,
    /// Bumped on every configuration swap; results are then kept only for
    /// dials whose mapping survived the swap unchanged
    generation: u64,
}

impl EngineState {
    fn new(config: MonitorConfig) -> Self {
        let dials = config
            .active_mappings()
            .map(|m| (m.dial_uid.clone(), MonitoringState::fresh()))
            .collect();
        Self {
            config,
            dials,
            generation: 0,
        }
    }
}

/// What one cycle decided for one dial
struct Outcome {
    uid: DialUid,
    /// Mapping the cycle was planned with
    mapping: SensorMapping,
    reading: Option<SensorReading>,
    written_percentage: Option<u8>,
    written_color: Option<DialColor>,
    /// Color mode is off, so there is no color to track
    colorless: bool,
    init_done: bool,
    wrote: bool,
}

/// Counters for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub written: usize,
    pub unchanged: usize,
    pub debounced: usize,
    pub no_data: usize,
    pub failed: usize,
}

pub struct MonitorEngine {
    state: Mutex<EngineState>,
    writer: Arc<dyn DialWriter>,
    source: Arc<dyn ReadingSource>,
    bus: SharedBus,
}

impl MonitorEngine {
    pub fn new(
        config: MonitorConfig,
        writer: Arc<dyn DialWriter>,
        source: Arc<dyn ReadingSource>,
        bus: SharedBus,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::new(config)),
            writer,
            source,
            bus,
        }
    }

    /// Swap the configuration atomically. Dials leaving the active set lose
    /// their state; new dials, and dials whose mapping changed, are
    /// re-initialized on the next cycle.
    pub async fn replace_config(&self, config: MonitorConfig) {
        let mut state = self.state.lock().await;

        let old: HashMap<DialUid, SensorMapping> = state
            .config
            .active_mappings()
            .map(|m| (m.dial_uid.clone(), m.clone()))
            .collect();
        let new: Vec<SensorMapping> = config.active_mappings().cloned().collect();

        state
            .dials
            .retain(|uid, _| new.iter().any(|m| &m.dial_uid == uid));
        for mapping in &new {
            let changed = old.get(&mapping.dial_uid) != Some(mapping);
            let entry = state
                .dials
                .entry(mapping.dial_uid.clone())
                .or_insert_with(MonitoringState::fresh);
            if changed {
                entry.pending_init = true;
            }
        }

        state.config = config;
        state.generation += 1;
        info!("Monitor configuration replaced: {} active dial(s)", state.dials.len());
    }

    pub async fn config(&self) -> MonitorConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn dial_state(&self, uid: &DialUid) -> Option<MonitoringState> {
        self.state.lock().await.dials.get(uid).cloned()
    }

    pub async fn active_dials(&self) -> Vec<DialUid> {
        let state = self.state.lock().await;
        state.config.active_mappings().map(|m| m.dial_uid.clone()).collect()
    }

    /// Write position and color to every dial still awaiting its
    /// on-entry initialization.
    pub async fn initialize_pending(&self) -> CycleReport {
        self.cycle(true).await
    }

    /// One monitoring pass over all active dials.
    pub async fn run_cycle(&self) -> CycleReport {
        self.cycle(false).await
    }

    async fn cycle(&self, pending_only: bool) -> CycleReport {
        // Plan under the lock, then release it before any device I/O
        let (generation, debounce, plan) = {
            let state = self.state.lock().await;
            let plan: Vec<(SensorMapping, MonitoringState)> = state
                .config
                .active_mappings()
                .filter_map(|m| state.dials.get(&m.dial_uid).map(|s| (m.clone(), s.clone())))
                .filter(|(_, s)| !pending_only || s.pending_init)
                .collect();
            (state.generation, state.config.debounce, plan)
        };

        let mut report = CycleReport::default();
        if plan.is_empty() {
            return report;
        }

        let readings = self.source.current_readings().await;
        let provider_connected = self.source.is_connected().await;

        let mut outcomes = Vec::with_capacity(plan.len());
        for (mapping, dial) in plan {
            let outcome = self
                .apply(&mapping, &dial, &readings, provider_connected, debounce, &mut report)
                .await;
            outcomes.push(outcome);
        }

        let mut state = self.state.lock().await;
        let swapped = state.generation != generation;
        let current: HashMap<DialUid, SensorMapping> = if swapped {
            state
                .config
                .active_mappings()
                .map(|m| (m.dial_uid.clone(), m.clone()))
                .collect()
        } else {
            HashMap::new()
        };
        for outcome in outcomes {
            if swapped && current.get(&outcome.uid) != Some(&outcome.mapping) {
                debug!("{}: mapping changed during cycle, discarding result", outcome.uid);
                continue;
            }
            let Some(dial) = state.dials.get_mut(&outcome.uid) else {
                continue;
            };
            if outcome.reading.is_some() {
                dial.last_reading = outcome.reading;
            }
            if let Some(p) = outcome.written_percentage {
                dial.last_percentage = Some(p);
            }
            if outcome.colorless {
                dial.last_color = None;
            } else if let Some(c) = outcome.written_color {
                dial.last_color = Some(c);
            }
            if outcome.wrote {
                dial.last_write = Some(Instant::now());
                dial.last_update = Some(Utc::now());
                dial.update_count += 1;
            }
            if outcome.init_done {
                dial.pending_init = false;
            }
        }
        report
    }

    async fn apply(
        &self,
        mapping: &SensorMapping,
        dial: &MonitoringState,
        readings: &[SensorReading],
        provider_connected: bool,
        debounce: Duration,
        report: &mut CycleReport,
    ) -> Outcome {
        let uid = &mapping.dial_uid;
        let mut outcome = Outcome {
            uid: uid.clone(),
            mapping: mapping.clone(),
            reading: None,
            written_percentage: None,
            written_color: None,
            colorless: false,
            init_done: false,
            wrote: false,
        };

        let fresh = mapping.resolve(readings).ok().cloned();
        let reading = match (&fresh, &dial.last_reading) {
            (Some(r), _) => r.clone(),
            (None, Some(cached)) => {
                debug!("{}: no fresh reading, using cached value {}", uid, cached.value);
                cached.clone()
            }
            (None, None) => {
                let reason = if provider_connected {
                    MappingError::NoMatch(mapping.sensor.to_string())
                } else {
                    MappingError::ProviderDisconnected
                };
                debug!("{}: skipped ({})", uid, reason);
                report.no_data += 1;
                return outcome;
            }
        };
        outcome.reading = fresh;

        let percentage = mapping.percentage(reading.value);
        let color = mapping.color_for(reading.value);
        outcome.colorless = color.is_none();

        let init = dial.pending_init;
        let position_changed = dial.last_percentage != Some(percentage);
        let color_changed = !mapping.color.is_static() && color.is_some() && dial.last_color != color;

        let write_position = init || position_changed;
        let write_color = color.is_some() && (init || color_changed);

        if !write_position && !write_color {
            report.unchanged += 1;
            return outcome;
        }

        if !init {
            if let Some(last) = dial.last_write {
                if last.elapsed() < debounce {
                    report.debounced += 1;
                    return outcome;
                }
            }
        }

        let mut failed = false;
        if write_position {
            match self.writer.write_position(uid, percentage).await {
                Ok(()) => {
                    outcome.written_percentage = Some(percentage);
                    outcome.wrote = true;
                }
                Err(e) => {
                    failed = true;
                    self.report_failure(uid, &e);
                }
            }
        }
        if let (true, Some(c)) = (write_color, color) {
            match self.writer.write_color(uid, c).await {
                Ok(()) => {
                    outcome.written_color = Some(c);
                    outcome.wrote = true;
                }
                Err(e) => {
                    failed = true;
                    self.report_failure(uid, &e);
                }
            }
        }

        if failed {
            report.failed += 1;
        } else {
            report.written += 1;
            outcome.init_done = init;
            debug!(
                "{}: {:.1}{} -> {}%{}",
                uid,
                reading.value,
                reading.unit,
                percentage,
                color.map(|c| format!(" {}", c)).unwrap_or_default()
            );
            self.bus.publish(BusEvent::DialUpdated {
                uid: uid.clone(),
                percentage,
                color,
                value: reading.value,
            });
        }
        outcome
    }

    fn report_failure(&self, uid: &DialUid, error: &DialError) {
        warn!("{}: dial update failed: {}", uid, error);
        self.bus.publish(BusEvent::DialError {
            uid: uid.clone(),
            error: error.to_string(),
        });
    }

    /// Cycle on the configured interval until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut period = self.config().await.interval;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_cycle().await;
            if report.written > 0 || report.failed > 0 {
                debug!("Monitor cycle: {:?}", report);
            }

            let configured = self.config().await.interval;
            if configured != period {
                period = configured;
                ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }

        info!("Monitor stopped");
        self.bus.publish(BusEvent::TaskStopped {
            task: "monitor".to_string(),
            reason: "cancelled".to_string(),
        });
    }
}
