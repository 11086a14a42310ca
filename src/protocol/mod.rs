//! Hub wire protocol
//!
//! ASCII-hex framing of typed commands and responses, plus the command,
//! data-type and status vocabulary. Pure: no I/O happens in this module.

pub mod codec;
pub mod constants;
pub mod error;
pub mod status;

pub use codec::{
    bytes_to_hex, decode_ascii, decode_length, encode_length, read_u16_be,
    read_u32_be, Command, ResponseMessage,
};
pub use constants::{
    CommandCode, DataType, HEADER_LEN, MAX_PAYLOAD_LEN, REQUEST_MARKER, REQUEST_TERMINATOR,
    RESPONSE_MARKER,
};
pub use error::ProtocolError;
pub use status::StatusCode;
