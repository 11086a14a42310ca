//! dial-telemetry-bridge
//!
//! Maps live hardware telemetry onto USB-serial analog dials.
//!
//! This library provides:
//! - The hub's framed ASCII-hex command protocol
//! - A shared, serialized serial transport with hub auto-detection
//! - Dial discovery with UID-keyed device records
//! - E-paper image packing for the dial displays
//! - Sensor-to-dial mapping with a debounced monitoring loop

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod dials;
pub mod monitor;
pub mod protocol;
pub mod sensors;
pub mod transport;
