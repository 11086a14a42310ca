//! Serial endpoint enumeration and opening.
//!
//! The transport only needs a byte stream, so real ports and in-memory test
//! streams share the `DynSerial` trait object.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::debug;

use super::error::TransportError;

pub trait SerialIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialIo for T {}

pub type DynSerial = Box<dyn SerialIo>;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line settings for the hub (8N1, handshake lines asserted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Source of serial endpoints.
pub trait PortConnector: Send + Sync {
    /// Endpoint names in enumeration order.
    fn available_ports(&self) -> Result<Vec<String>, TransportError>;

    fn open(&self, name: &str, settings: &SerialSettings) -> Result<DynSerial, TransportError>;
}

/// Operating-system serial ports via `tokio-serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortConnector for SystemPorts {
    fn available_ports(&self) -> Result<Vec<String>, TransportError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, name: &str, settings: &SerialSettings) -> Result<DynSerial, TransportError> {
        let open_err = |e: tokio_serial::Error| TransportError::Open {
            port: name.to_string(),
            source: std::io::Error::from(e),
        };

        let mut port = tokio_serial::new(name, settings.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(open_err)?;

        // Some USB-serial bridges only pass data with DTR/RTS asserted
        port.write_data_terminal_ready(true).map_err(open_err)?;
        port.write_request_to_send(true).map_err(open_err)?;

        debug!(port = %name, baud = settings.baud_rate, "Serial port opened");
        Ok(Box::new(port))
    }
}
