//! Event types published on the bridge event bus.
//!
//! Status changes, discovery results, per-dial updates and provider
//! connectivity all flow through one typed enum so the binary (and any
//! future surface) can observe the bridge without registering callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dials::DialUid;
use crate::monitor::DialColor;

// =============================================================================
// BridgeStatus
// =============================================================================

/// Coarse lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    #[default]
    Idle,
    Connecting,
    Initializing,
    ConnectingProvider,
    Monitoring,
    Failed,
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Initializing => write!(f, "initializing"),
            Self::ConnectingProvider => write!(f, "connecting provider"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// BusEvent
// =============================================================================

/// All events that can be published on the event bus.
///
/// Events are organized into categories:
/// - Lifecycle: status transitions, shutdown, stopped tasks
/// - Devices: discovery results
/// - Dials: applied updates and per-dial failures
/// - Provider: sensor provider connectivity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    // =========================================================================
    // Lifecycle Events
    // =========================================================================
    /// Bridge status transition
    StatusChanged {
        status: BridgeStatus,
        /// Human-readable detail
        message: String,
    },

    /// System is shutting down
    ShuttingDown {
        /// Reason for shutdown
        reason: Option<String>,
    },

    /// A background task exited
    TaskStopped {
        /// Task identifier (e.g., "monitor", "sensor_hub")
        task: String,
        reason: String,
    },

    // =========================================================================
    // Device Events
    // =========================================================================
    /// Discovery finished
    DevicesDiscovered {
        /// Dials currently mapped to a bus index, ordered by index
        uids: Vec<DialUid>,
    },

    // =========================================================================
    // Dial Events
    // =========================================================================
    /// A dial received a physical update
    DialUpdated {
        uid: DialUid,
        percentage: u8,
        /// Applied color, `None` when the mapping's color mode is off
        color: Option<DialColor>,
        /// Raw sensor value the percentage was computed from
        value: f64,
    },

    /// Writing to a dial failed (monitoring continues)
    DialError { uid: DialUid, error: String },

    // =========================================================================
    // Provider Events
    // =========================================================================
    /// Sensor provider connected or disconnected
    ProviderConnectionChanged { provider: String, connected: bool },
}

impl BusEvent {
    /// Get the event type as a string (for logging/filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::ShuttingDown { .. } => "shutting_down",
            Self::TaskStopped { .. } => "task_stopped",
            Self::DevicesDiscovered { .. } => "devices_discovered",
            Self::DialUpdated { .. } => "dial_updated",
            Self::DialError { .. } => "dial_error",
            Self::ProviderConnectionChanged { .. } => "provider_connection_changed",
        }
    }

    /// Check if this is a per-dial event
    pub fn is_dial_event(&self) -> bool {
        matches!(self, Self::DialUpdated { .. } | Self::DialError { .. })
    }

    /// Check if this is a lifecycle event
    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            Self::StatusChanged { .. } | Self::ShuttingDown { .. } | Self::TaskStopped { .. }
        )
    }
}
