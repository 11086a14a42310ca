//! Response framing without line terminators.
//!
//! The hub does not reliably terminate responses, so the reader computes the
//! frame size from the header: `9 + 2 × declared_length` bytes from the `<`
//! marker. It returns as soon as that many bytes have arrived.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use super::error::TransportError;
use crate::protocol::{decode_length, HEADER_LEN, RESPONSE_MARKER};

/// Longest single wait on the port before counting an empty poll.
const READ_SLICE: Duration = Duration::from_millis(20);
/// Empty polls tolerated before the reader backs off.
const EMPTY_POLLS_BEFORE_BACKOFF: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(5);

/// Total frame length once the header is available.
///
/// `buf` must start at the response marker. Returns `Ok(None)` while the
/// header is still incomplete.
pub fn expected_frame_len(buf: &[u8]) -> Result<Option<usize>, TransportError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let declared = decode_length(&buf[5..HEADER_LEN])?;
    Ok(Some(HEADER_LEN + declared * 2))
}

/// Incremental frame assembler.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes, dropping anything before the first marker
    /// (stale terminators from previous responses).
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        match self.buf.iter().position(|&b| b == RESPONSE_MARKER) {
            Some(0) => {}
            Some(start) => {
                self.buf.drain(..start);
            }
            None => self.buf.clear(),
        }
    }

    /// Take a complete frame if one is buffered.
    pub fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(total) = expected_frame_len(&self.buf)? else {
            return Ok(None);
        };
        if self.buf.len() < total {
            return Ok(None);
        }
        let frame: Vec<u8> = self.buf.drain(..total).collect();
        Ok(Some(frame))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Read one response frame, or `Ok(None)` if `deadline` passes first.
pub async fn read_frame<R>(reader: &mut R, deadline: Instant) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; 256];
    let mut empty_polls = 0u32;

    loop {
        if let Some(frame) = frames.take_frame()? {
            return Ok(Some(frame));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        match tokio::time::timeout(remaining.min(READ_SLICE), reader.read(&mut chunk)).await {
            Ok(Ok(0)) => return Err(TransportError::Disconnected),
            Ok(Ok(n)) => {
                frames.extend(&chunk[..n]);
                empty_polls = 0;
            }
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_) => {
                empty_polls += 1;
                if empty_polls >= EMPTY_POLLS_BEFORE_BACKOFF {
                    tokio::time::sleep(BACKOFF.min(remaining)).await;
                    empty_polls = 0;
                }
            }
        }
    }
}
