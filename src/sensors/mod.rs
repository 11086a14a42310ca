//! Sensor providers and the polling hub
//!
//! A provider exposes the current set of hardware readings. The hub owns one
//! provider, keeps the latest snapshot, and handles reconnects; the monitor
//! only ever reads snapshots through [`ReadingSource`].

pub mod file;
pub mod hub;

pub use file::FileSensorProvider;
pub use hub::{ConnectOutcome, HubConfig, SensorHub};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reading category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    Temperature,
    Load,
    Fan,
    Voltage,
    Power,
    Clock,
    #[default]
    Other,
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Load => write!(f, "load"),
            Self::Fan => write!(f, "fan"),
            Self::Voltage => write!(f, "voltage"),
            Self::Power => write!(f, "power"),
            Self::Clock => write!(f, "clock"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl From<&str> for SensorCategory {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "temperature" | "temp" => Self::Temperature,
            "load" | "usage" => Self::Load,
            "fan" => Self::Fan,
            "voltage" | "volt" => Self::Voltage,
            "power" => Self::Power,
            "clock" | "frequency" => Self::Clock,
            _ => Self::Other,
        }
    }
}

/// One value reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: u32,
    #[serde(default)]
    pub sensor_instance: u32,
    pub sensor_name: String,
    pub entry_id: u32,
    pub entry_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub category: SensorCategory,
}

/// Hardware telemetry source.
#[async_trait]
pub trait SensorProvider: Send + Sync {
    /// Provider name for logs and bus events
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;

    /// All current readings
    async fn readings(&self) -> Result<Vec<SensorReading>>;

    async fn readings_by_category(&self, category: SensorCategory) -> Result<Vec<SensorReading>> {
        Ok(self
            .readings()
            .await?
            .into_iter()
            .filter(|r| r.category == category)
            .collect())
    }
}

/// Read side of the sensor hub as seen by the monitor.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Latest snapshot (empty when the provider has nothing)
    async fn current_readings(&self) -> Vec<SensorReading>;

    async fn is_connected(&self) -> bool;
}
