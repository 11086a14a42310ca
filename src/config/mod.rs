//! Configuration management
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `config.{toml,json,yaml}` in the config directory, then environment
//! variables (`DIALBRIDGE_SERIAL__PORT`, `DIALBRIDGE_MONITOR__DEBOUNCE_MS`, ...).

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::monitor::{MonitorConfig, SensorMapping, MAX_DIALS};
use crate::sensors::HubConfig;
use crate::transport::{SerialSettings, DEFAULT_BAUD_RATE};

const ENV_PREFIX: &str = "DIALBRIDGE";
const APP_DIR_NAME: &str = "dial-telemetry-bridge";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub sensors: SensorsConfig,

    #[serde(default)]
    pub mappings: Vec<SensorMapping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    /// Explicit port; auto-detect when unset
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_probe_timeout_ms() -> u64 {
    500
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_dial_count")]
    pub dial_count: usize,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_dial_count() -> usize {
    MAX_DIALS
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            debounce_ms: default_debounce_ms(),
            dial_count: default_dial_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    /// JSON snapshot written by an external exporter
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_reconnect_attempts() -> u32 {
    300
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl SensorsConfig {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    /// Snapshot path, defaulting to `sensors.json` in the config directory
    pub fn snapshot_path_or_default(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| get_config_dir().join("sensors.json"))
    }
}

impl Config {
    /// Monitor settings with the dial window capped at the hub's limit.
    pub fn monitor_config(&self) -> MonitorConfig {
        if self.monitor.dial_count > MAX_DIALS {
            tracing::warn!(
                "monitor.dial_count {} exceeds the hub limit, using {}",
                self.monitor.dial_count,
                MAX_DIALS
            );
        }
        MonitorConfig {
            interval: Duration::from_millis(self.monitor.interval_ms.max(1)),
            debounce: Duration::from_millis(self.monitor.debounce_ms),
            dial_count: self.monitor.dial_count.min(MAX_DIALS),
            mappings: self.mappings.clone(),
        }
    }
}

/// Get config directory (DIALBRIDGE_CONFIG_DIR or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DIALBRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Load configuration from the default config directory.
pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_dir())
}

/// Load configuration with `config_dir` as the file location.
pub fn load_config_from(config_dir: &Path) -> Result<Config> {
    let config = ::config::Config::builder()
        // Start with defaults
        .set_default("serial.baud_rate", i64::from(DEFAULT_BAUD_RATE))?
        .set_default("monitor.dial_count", MAX_DIALS as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (DIALBRIDGE_SERIAL__PORT, etc.)
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
