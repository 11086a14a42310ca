//! Sensor-driven dial monitoring
//!
//! `mapping` holds the pure value transforms (selector matching, percentage,
//! color); `engine` runs the change-detecting, debounced write loop.

pub mod engine;
pub mod mapping;

pub use engine::{
    CycleReport, DialWriter, MonitorConfig, MonitorEngine, MonitoringState, DEFAULT_DEBOUNCE,
    DEFAULT_INTERVAL, MAX_DIALS,
};
pub use mapping::{
    compute_percentage, select_color, ColorMode, DialColor, MappingError, SensorMapping,
    SensorSelector,
};
