use thiserror::Error;

use super::status::StatusCode;

/// Codec-level failures. The codec performs no I/O, so these all describe
/// malformed frames or responses that do not match what was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("payload of {len} bytes exceeds the 16-bit length field")]
    PayloadTooLarge { len: usize },

    #[error("command 0x{command:02X} failed with status {status}")]
    Status { command: u8, status: StatusCode },

    #[error("unexpected data type 0x{actual:02X} (expected 0x{expected:02X})")]
    DataTypeMismatch { expected: u8, actual: u8 },

    #[error("response echoes command 0x{received:02X} but 0x{sent:02X} was sent")]
    CommandMismatch { sent: u8, received: u8 },
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
