//! Dial device support
//!
//! Registry of discovered dials keyed by permanent UID, the typed command
//! surface on top of the serial transport, and the e-paper image codec.

pub mod controller;
pub mod image;
pub mod store;

pub use controller::{DialController, DialError, PROVISION_ATTEMPTS};
pub use image::ImageError;
pub use store::{Backlight, DeviceInfo, DeviceRecord, DialStore, DialUid, EasingConfig};
