use std::time::Duration;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Failures raised while talking to the hub. The transport reports these
/// as-is and never retries on its own.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),

    #[error("no serial ports available")]
    NoPorts,

    #[error("transport is not connected")]
    NotConnected,

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("serial connection closed by the device")]
    Disconnected,

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
