//! Serial transport for the dial hub
//!
//! Owns at most one open connection and runs exactly one request/response
//! exchange at a time. Callers queue on the connection mutex; every exchange
//! carries its own deadline.

pub mod error;
pub mod framing;
pub mod port;

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use error::TransportError;
pub use framing::{expected_frame_len, read_frame, FrameBuffer};
pub use port::{DynSerial, PortConnector, SerialIo, SerialSettings, SystemPorts, DEFAULT_BAUD_RATE};

use crate::protocol::{Command, CommandCode, ResponseMessage, REQUEST_TERMINATOR};

/// Queries (device map, UID, info strings)
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(1);
/// Bus operations (rescan, provision, reset, power)
pub const BUS_TIMEOUT: Duration = Duration::from_secs(3);
/// Value, color and easing writes
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// One image data chunk
pub const IMAGE_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for a probe answer during auto-detection
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

struct Connection {
    name: String,
    port: DynSerial,
}

/// Shared serial transport.
pub struct SerialTransport {
    connection: Mutex<Option<Connection>>,
    settings: SerialSettings,
    probe_timeout: Duration,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(SerialSettings::default(), DEFAULT_PROBE_TIMEOUT)
    }
}

impl SerialTransport {
    pub fn new(settings: SerialSettings, probe_timeout: Duration) -> Self {
        Self {
            connection: Mutex::new(None),
            settings,
            probe_timeout,
        }
    }

    /// Open the hub connection.
    ///
    /// With `preferred` set, that endpoint is opened without probing.
    /// Otherwise every enumerated endpoint is probed with a rescan and the
    /// first one giving a well-formed response wins. If none answers, the
    /// first enumerated endpoint is used unverified.
    pub async fn connect(
        &self,
        connector: &dyn PortConnector,
        preferred: Option<&str>,
    ) -> Result<String, TransportError> {
        self.disconnect().await;

        let (name, port) = match preferred {
            Some(name) => (name.to_string(), connector.open(name, &self.settings)?),
            None => self.detect(connector).await?,
        };

        info!(port = %name, baud = self.settings.baud_rate, "Connected to dial hub");
        self.attach(name.clone(), port).await;
        Ok(name)
    }

    /// Install an already-open stream as the connection.
    pub async fn attach(&self, name: impl Into<String>, port: DynSerial) {
        let mut conn_guard = self.connection.lock().await;
        *conn_guard = Some(Connection {
            name: name.into(),
            port,
        });
    }

    pub async fn disconnect(&self) {
        let previous = {
            let mut conn_guard = self.connection.lock().await;
            conn_guard.take()
        };
        if let Some(conn) = previous {
            info!(port = %conn.name, "Disconnected from dial hub");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub async fn port_name(&self) -> Option<String> {
        self.connection.lock().await.as_ref().map(|c| c.name.clone())
    }

    async fn detect(
        &self,
        connector: &dyn PortConnector,
    ) -> Result<(String, DynSerial), TransportError> {
        let candidates = connector.available_ports()?;
        let Some(first) = candidates.first().cloned() else {
            return Err(TransportError::NoPorts);
        };

        for name in &candidates {
            let mut port = match connector.open(name, &self.settings) {
                Ok(port) => port,
                Err(e) => {
                    debug!(port = %name, error = %e, "Skipping port that failed to open");
                    continue;
                }
            };
            if probe(&mut port, self.probe_timeout).await {
                debug!(port = %name, "Hub answered probe");
                return Ok((name.clone(), port));
            }
            debug!(port = %name, "No probe response");
        }

        warn!(
            port = %first,
            "No port answered the hub probe; falling back to the first enumerated port (unverified)"
        );
        let port = connector.open(&first, &self.settings)?;
        Ok((first, port))
    }

    /// Send `command` and wait for its response frame.
    ///
    /// Holds the connection for the whole exchange. An end-of-stream or I/O
    /// failure drops the connection.
    pub async fn exchange(
        &self,
        command: &Command,
        timeout: Duration,
    ) -> Result<ResponseMessage, TransportError> {
        let request = command.encode()?;
        let deadline = Instant::now() + timeout;

        let mut conn_guard = self.connection.lock().await;
        let Some(conn) = conn_guard.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        debug!(command = %command.label(), request = %request, "-> hub");
        match exchange_on(&mut conn.port, &request, deadline).await {
            Ok(Some(frame)) => {
                let response = ResponseMessage::decode(&frame)?;
                debug!(
                    command = %command.label(),
                    response = %String::from_utf8_lossy(&frame),
                    "<- hub"
                );
                Ok(response)
            }
            Ok(None) => Err(TransportError::Timeout {
                command: command.label(),
                timeout,
            }),
            Err(e @ (TransportError::Disconnected | TransportError::Io(_))) => {
                warn!(port = %conn.name, error = %e, "Serial connection lost");
                *conn_guard = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange a write-style command that must answer with status OK.
    pub async fn send(&self, command: &Command, timeout: Duration) -> Result<(), TransportError> {
        let response = self.exchange(command, timeout).await?;
        response.expect_success(command.code)?;
        Ok(())
    }

    /// Exchange a query and return its data payload.
    pub async fn query(&self, command: &Command, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let response = self.exchange(command, timeout).await?;
        Ok(response.expect_data(command.code)?.to_vec())
    }
}

/// Discard whatever the device sent since the last exchange.
async fn drain_pending(port: &mut DynSerial) {
    let mut scratch = [0u8; 256];
    let mut discarded = 0usize;
    while let Ok(Ok(n)) = tokio::time::timeout(Duration::ZERO, port.read(&mut scratch)).await {
        if n == 0 {
            break;
        }
        discarded += n;
    }
    if discarded > 0 {
        debug!(bytes = discarded, "Drained stale bytes");
    }
}

async fn exchange_on(
    port: &mut DynSerial,
    request: &str,
    deadline: Instant,
) -> Result<Option<Vec<u8>>, TransportError> {
    drain_pending(port).await;

    let mut line = String::with_capacity(request.len() + REQUEST_TERMINATOR.len());
    line.push_str(request);
    line.push_str(REQUEST_TERMINATOR);

    let write = async {
        port.write_all(line.as_bytes()).await?;
        port.flush().await
    };
    match tokio::time::timeout_at(deadline, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(TransportError::Io(e)),
        Err(_) => return Ok(None),
    }

    read_frame(port, deadline).await
}

/// True if the endpoint answers a rescan with any well-formed response.
async fn probe(port: &mut DynSerial, timeout: Duration) -> bool {
    let Ok(request) = Command::bare(CommandCode::RescanBus).encode() else {
        return false;
    };
    match exchange_on(port, &request, Instant::now() + timeout).await {
        Ok(Some(frame)) => ResponseMessage::decode(&frame).is_ok(),
        _ => false,
    }
}
