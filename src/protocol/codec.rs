//! Frame encoding and decoding.
//!
//! Both directions share one layout, differing only in the leading marker:
//!
//! ```text
//! >CCDDLLLL[DATA]   request  (CC command, DD data type, LLLL payload bytes)
//! <CCDDLLLL[DATA]   response
//! ```
//!
//! Every field is ASCII hex; the payload is hex-encoded so its on-wire length
//! is twice the declared length.

use super::constants::{
    CommandCode, DataType, HEADER_LEN, MAX_PAYLOAD_LEN, REQUEST_MARKER, RESPONSE_MARKER,
};
use super::error::ProtocolError;
use super::status::StatusCode;

// =============================================================================
// Hex helpers
// =============================================================================

/// Encode bytes as uppercase hex (the form the firmware emits).
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Encode a payload length as the 4-hex-digit big-endian length field.
pub fn encode_length(len: usize) -> Result<String, ProtocolError> {
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge { len });
    }
    Ok(format!("{:04X}", len))
}

/// Decode the 4-hex-digit length field.
pub fn decode_length(field: &[u8]) -> Result<usize, ProtocolError> {
    if field.len() != 4 {
        return Err(ProtocolError::malformed(format!(
            "length field must be 4 hex digits, got {}",
            field.len()
        )));
    }
    let bytes = hex_field(field, "length")?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}

/// Decode a hex-encoded ASCII string payload (firmware/hardware/protocol info).
///
/// Trailing NUL padding and whitespace are trimmed.
pub fn decode_ascii(payload: &[u8]) -> Result<String, ProtocolError> {
    if !payload.is_ascii() {
        return Err(ProtocolError::malformed("string payload is not ASCII"));
    }
    let text = String::from_utf8_lossy(payload);
    Ok(text
        .trim_end_matches(|c: char| c == '\0' || c.is_ascii_whitespace())
        .trim_start()
        .to_string())
}

/// Read a big-endian `u16` from the start of a payload.
pub fn read_u16_be(payload: &[u8]) -> Result<u16, ProtocolError> {
    match payload {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(ProtocolError::malformed(format!(
            "expected at least 2 bytes, got {}",
            payload.len()
        ))),
    }
}

/// Read a big-endian `u32` at `offset`.
pub fn read_u32_be(payload: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    payload
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| {
            ProtocolError::malformed(format!(
                "expected 4 bytes at offset {}, payload is {} bytes",
                offset,
                payload.len()
            ))
        })
}

fn hex_field(field: &[u8], what: &str) -> Result<Vec<u8>, ProtocolError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| ProtocolError::malformed(format!("{} field is not ASCII", what)))?;
    hex::decode(text)
        .map_err(|_| ProtocolError::malformed(format!("{} field '{}' is not hex", what, text)))
}

/// Fields shared by requests and responses once the marker is checked.
struct RawFrame {
    command: u8,
    data_type: u8,
    declared_len: usize,
    payload: Vec<u8>,
}

fn parse_frame(frame: &[u8], marker: u8) -> Result<RawFrame, ProtocolError> {
    let end = frame
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let frame = &frame[..end];

    if frame.len() < HEADER_LEN {
        return Err(ProtocolError::malformed(format!(
            "frame is {} bytes, header needs {}",
            frame.len(),
            HEADER_LEN
        )));
    }
    if frame[0] != marker {
        return Err(ProtocolError::malformed(format!(
            "expected marker '{}', got 0x{:02X}",
            marker as char, frame[0]
        )));
    }

    let command = hex_field(&frame[1..3], "command")?[0];
    let data_type = hex_field(&frame[3..5], "data type")?[0];
    let declared_len = decode_length(&frame[5..9])?;

    let body = &frame[HEADER_LEN..];
    if body.len() != declared_len * 2 {
        return Err(ProtocolError::malformed(format!(
            "declared {} payload bytes but frame carries {} hex digits",
            declared_len,
            body.len()
        )));
    }
    let payload = if body.is_empty() {
        Vec::new()
    } else {
        hex_field(body, "payload")?
    };

    Ok(RawFrame {
        command,
        data_type,
        declared_len,
        payload,
    })
}

fn known_data_type(tag: u8) -> Result<DataType, ProtocolError> {
    DataType::from_u8(tag)
        .ok_or_else(|| ProtocolError::malformed(format!("unknown data type 0x{:02X}", tag)))
}

// =============================================================================
// Command (request)
// =============================================================================

/// A request to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: u8,
    pub data_type: DataType,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(code: CommandCode, data_type: DataType, payload: Vec<u8>) -> Self {
        Self::raw(code.as_u8(), data_type, payload)
    }

    /// Build a command from an arbitrary code byte.
    pub fn raw(code: u8, data_type: DataType, payload: Vec<u8>) -> Self {
        Self {
            code,
            data_type,
            payload,
        }
    }

    /// Command without payload (rescan, provision, devices map, ...)
    pub fn bare(code: CommandCode) -> Self {
        Self::new(code, DataType::None, Vec::new())
    }

    /// Command carrying a single byte (usually a dial index).
    pub fn single(code: CommandCode, value: u8) -> Self {
        Self::new(code, DataType::SingleValue, vec![value])
    }

    /// Key/value command: a dial index followed by its value bytes.
    pub fn key_value(code: CommandCode, key: u8, value: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(1 + value.len());
        payload.push(key);
        payload.extend_from_slice(value);
        Self::new(code, DataType::KeyValuePair, payload)
    }

    pub fn multiple(code: CommandCode, payload: Vec<u8>) -> Self {
        Self::new(code, DataType::MultipleValue, payload)
    }

    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::from_u8(self.code)
    }

    /// Human-readable command name for logs.
    pub fn label(&self) -> String {
        match self.command_code() {
            Some(code) => code.name().to_string(),
            None => format!("0x{:02X}", self.code),
        }
    }

    /// Serialize to `>CCDDLLLL[DATA]` (no terminator).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let len = encode_length(self.payload.len())?;
        Ok(format!(
            "{}{:02X}{:02X}{}{}",
            REQUEST_MARKER as char,
            self.code,
            self.data_type.as_u8(),
            len,
            bytes_to_hex(&self.payload)
        ))
    }

    /// Parse a request frame (trailing whitespace such as `\r\n` is ignored).
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let raw = parse_frame(frame, REQUEST_MARKER)?;
        Ok(Self {
            code: raw.command,
            data_type: known_data_type(raw.data_type)?,
            payload: raw.payload,
        })
    }
}

// =============================================================================
// ResponseMessage
// =============================================================================

/// A decoded hub response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    /// Command code echoed by the hub
    pub command: u8,
    pub data_type: DataType,
    /// Payload length declared in the header (always equals `payload.len()`)
    pub declared_len: usize,
    pub payload: Vec<u8>,
}

impl ResponseMessage {
    /// Status response for `command`.
    pub fn with_status(command: u8, status: StatusCode) -> Self {
        Self::with_data(command, DataType::StatusCode, status.code().to_be_bytes().to_vec())
    }

    /// Data response for `command`.
    pub fn with_data(command: u8, data_type: DataType, payload: Vec<u8>) -> Self {
        Self {
            command,
            data_type,
            declared_len: payload.len(),
            payload,
        }
    }

    /// Decode a response frame beginning with `<`.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let raw = parse_frame(frame, RESPONSE_MARKER)?;
        Ok(Self {
            command: raw.command,
            data_type: known_data_type(raw.data_type)?,
            declared_len: raw.declared_len,
            payload: raw.payload,
        })
    }

    /// Serialize to `<CCDDLLLL[DATA]`.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let len = encode_length(self.payload.len())?;
        Ok(format!(
            "{}{:02X}{:02X}{}{}",
            RESPONSE_MARKER as char,
            self.command,
            self.data_type.as_u8(),
            len,
            bytes_to_hex(&self.payload)
        ))
    }

    /// Status carried by a status-type response; `None` for data responses.
    pub fn status(&self) -> Option<Result<StatusCode, ProtocolError>> {
        if self.data_type != DataType::StatusCode {
            return None;
        }
        Some(read_u16_be(&self.payload).map(StatusCode::from))
    }

    /// True iff this is a status response carrying `0x0000`.
    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(Ok(StatusCode::Ok)))
    }

    fn check_echo(&self, sent: u8) -> Result<(), ProtocolError> {
        if self.command != sent {
            return Err(ProtocolError::CommandMismatch {
                sent,
                received: self.command,
            });
        }
        Ok(())
    }

    /// Validate a response to a write-style command: must echo `sent` and
    /// carry the OK status. Every other outcome is a failure.
    pub fn expect_success(&self, sent: u8) -> Result<(), ProtocolError> {
        self.check_echo(sent)?;
        match self.status() {
            Some(Ok(StatusCode::Ok)) => Ok(()),
            Some(Ok(status)) => Err(ProtocolError::Status {
                command: sent,
                status,
            }),
            Some(Err(e)) => Err(e),
            None => Err(ProtocolError::DataTypeMismatch {
                expected: DataType::StatusCode.as_u8(),
                actual: self.data_type.as_u8(),
            }),
        }
    }

    /// Validate a response to a query: must echo `sent` and carry data.
    /// A status frame here means the query failed.
    pub fn expect_data(&self, sent: u8) -> Result<&[u8], ProtocolError> {
        self.check_echo(sent)?;
        match self.status() {
            None => Ok(&self.payload),
            Some(Ok(StatusCode::Ok)) => Err(ProtocolError::DataTypeMismatch {
                expected: DataType::MultipleValue.as_u8(),
                actual: DataType::StatusCode.as_u8(),
            }),
            Some(Ok(status)) => Err(ProtocolError::Status {
                command: sent,
                status,
            }),
            Some(Err(e)) => Err(e),
        }
    }
}
