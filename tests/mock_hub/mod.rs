#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]
//! Mock dial hub for integration testing
//!
//! Simulates the hub firmware's command table over an in-memory duplex
//! stream. Each `open` through [`MockPorts`] spawns a fresh device task that
//! shares one [`MockHubState`], so tests can inspect positions, backlights
//! and the full request log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use dial_telemetry_bridge::protocol::{Command, CommandCode, DataType, ResponseMessage, StatusCode};
use dial_telemetry_bridge::transport::{DynSerial, PortConnector, SerialSettings, TransportError};

/// Simulated bus state
#[derive(Debug, Clone, Default)]
pub struct MockHubState {
    /// Bus index -> 12-byte UID
    pub slots: Vec<Option<[u8; 12]>>,
    pub positions: HashMap<u8, u8>,
    pub backlights: HashMap<u8, [u8; 4]>,
    /// dial step, dial period, backlight step, backlight period
    pub easing: HashMap<u8, [u32; 4]>,
    pub images: HashMap<u8, Vec<u8>>,
    pub shown: Vec<u8>,
    pub powered: bool,
    /// Remaining provisioning requests answered with `Fail`
    pub provision_failures: u32,
    /// Command codes always answered with `Fail`
    pub failing: Vec<u8>,
    pub requests: Vec<Command>,
}

/// Handle to a simulated hub
#[derive(Clone)]
pub struct MockHub {
    state: Arc<Mutex<MockHubState>>,
}

impl MockHub {
    /// Hub with one dial per UID, at indices 0..n
    pub fn new(uids: &[[u8; 12]]) -> Self {
        let state = MockHubState {
            slots: uids.iter().copied().map(Some).collect(),
            powered: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Connector exposing this hub on `port`
    pub fn ports(&self, port: &str) -> MockPorts {
        MockPorts {
            names: vec![port.to_string()],
            hub: self.clone(),
        }
    }

    /// Move dials to new indices: slot `i` receives the dial previously at `order[i]`.
    pub fn reorder(&self, order: &[usize]) {
        let mut state = self.state.lock().unwrap();
        let previous = state.slots.clone();
        state.slots = order.iter().map(|&i| previous.get(i).copied().flatten()).collect();
        state.positions.clear();
    }

    /// Leave an empty index at `index`.
    pub fn unplug(&self, index: usize) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.slots.get_mut(index) {
            *slot = None;
        }
    }

    pub fn fail_provisioning(&self, times: u32) {
        self.state.lock().unwrap().provision_failures = times;
    }

    /// Answer every `code` request with `Fail` from now on.
    pub fn fail_command(&self, code: CommandCode) {
        self.state.lock().unwrap().failing.push(code.as_u8());
    }

    pub fn state(&self) -> MockHubState {
        self.state.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Command> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests with the given command code
    pub fn requests_for(&self, code: CommandCode) -> Vec<Command> {
        self.requests()
            .into_iter()
            .filter(|c| c.code == code.as_u8())
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    pub fn position(&self, index: u8) -> Option<u8> {
        self.state.lock().unwrap().positions.get(&index).copied()
    }

    pub fn backlight(&self, index: u8) -> Option<[u8; 4]> {
        self.state.lock().unwrap().backlights.get(&index).copied()
    }

    /// Index currently holding `uid`
    pub fn index_of(&self, uid: &[u8; 12]) -> Option<u8> {
        self.state
            .lock()
            .unwrap()
            .slots
            .iter()
            .position(|s| s.as_ref() == Some(uid))
            .map(|i| i as u8)
    }

    fn handle(&self, command: &Command) -> ResponseMessage {
        let mut state = self.state.lock().unwrap();
        state.requests.push(command.clone());
        respond(&mut state, command)
    }
}

fn ok(code: u8) -> ResponseMessage {
    ResponseMessage::with_status(code, StatusCode::Ok)
}

fn status(code: u8, status: StatusCode) -> ResponseMessage {
    ResponseMessage::with_status(code, status)
}

fn online(state: &MockHubState, index: u8) -> bool {
    matches!(state.slots.get(index as usize), Some(Some(_)))
}

fn respond(state: &mut MockHubState, command: &Command) -> ResponseMessage {
    let code = command.code;
    let payload = command.payload.as_slice();
    let Some(known) = command.command_code() else {
        return status(code, StatusCode::Unsupported);
    };
    if state.failing.contains(&code) {
        return status(code, StatusCode::Fail);
    }

    match known {
        CommandCode::RescanBus | CommandCode::ResetAllDevices => ok(code),
        CommandCode::ProvisionDevices => {
            if state.provision_failures > 0 {
                state.provision_failures -= 1;
                status(code, StatusCode::Fail)
            } else {
                ok(code)
            }
        }
        CommandCode::GetDevicesMap => {
            let flags = state.slots.iter().map(|s| u8::from(s.is_some())).collect();
            ResponseMessage::with_data(code, DataType::MultipleValue, flags)
        }
        CommandCode::GetDeviceUid => match payload.first().and_then(|i| state.slots.get(*i as usize)) {
            Some(Some(uid)) => ResponseMessage::with_data(code, DataType::MultipleValue, uid.to_vec()),
            _ => status(code, StatusCode::DeviceOffline),
        },
        CommandCode::SetDialPercentSingle => match payload {
            [index, percent] if online(state, *index) => {
                state.positions.insert(*index, *percent);
                ok(code)
            }
            [_, _] => status(code, StatusCode::DeviceOffline),
            _ => status(code, StatusCode::BadData),
        },
        CommandCode::SetDialPercentMultiple => {
            if payload.len() % 2 != 0 {
                return status(code, StatusCode::BadData);
            }
            for pair in payload.chunks(2) {
                if !online(state, pair[0]) {
                    return status(code, StatusCode::DeviceOffline);
                }
            }
            for pair in payload.chunks(2) {
                state.positions.insert(pair[0], pair[1]);
            }
            ok(code)
        }
        CommandCode::SetDialRawSingle
        | CommandCode::SetDialRawMultiple
        | CommandCode::CalibrateMax
        | CommandCode::CalibrateHalf => ok(code),
        CommandCode::DialPower => {
            state.powered = payload.first() == Some(&1);
            ok(code)
        }
        CommandCode::SetRgbBacklight => match payload {
            [index, r, g, b, w] if online(state, *index) => {
                state.backlights.insert(*index, [*r, *g, *b, *w]);
                ok(code)
            }
            _ => status(code, StatusCode::BadData),
        },
        CommandCode::SetDialEasingStep
        | CommandCode::SetDialEasingPeriod
        | CommandCode::SetBacklightEasingStep
        | CommandCode::SetBacklightEasingPeriod => {
            if payload.len() != 5 {
                return status(code, StatusCode::BadData);
            }
            let value = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
            let slot = match known {
                CommandCode::SetDialEasingStep => 0,
                CommandCode::SetDialEasingPeriod => 1,
                CommandCode::SetBacklightEasingStep => 2,
                _ => 3,
            };
            state.easing.entry(payload[0]).or_insert([5, 50, 5, 50])[slot] = value;
            ok(code)
        }
        CommandCode::GetEasingConfig => {
            let index = payload.first().copied().unwrap_or(0);
            let values = state.easing.get(&index).copied().unwrap_or([5, 50, 5, 50]);
            let bytes = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            ResponseMessage::with_data(code, DataType::MultipleValue, bytes)
        }
        CommandCode::GetRxBufferSize => {
            ResponseMessage::with_data(code, DataType::SingleValue, vec![0x04, 0x00])
        }
        CommandCode::DisplayClear | CommandCode::DisplayGotoXy => ok(code),
        CommandCode::DisplayImageData => match payload.split_first() {
            Some((index, data)) => {
                state.images.entry(*index).or_default().extend_from_slice(data);
                ok(code)
            }
            None => status(code, StatusCode::BadData),
        },
        CommandCode::DisplayShowImage => {
            if let Some(index) = payload.first() {
                state.shown.push(*index);
            }
            ok(code)
        }
        CommandCode::GetFirmwareInfo => text(code, "1.2.0"),
        CommandCode::GetHardwareInfo => text(code, "VU1-rev3"),
        CommandCode::GetProtocolInfo => text(code, "v1"),
        CommandCode::GetBuildInfo => text(code, "2024-01-15"),
    }
}

fn text(code: u8, value: &str) -> ResponseMessage {
    ResponseMessage::with_data(code, DataType::MultipleValue, value.as_bytes().to_vec())
}

async fn serve(hub: MockHub, device: DuplexStream) {
    let (rx, mut tx) = tokio::io::split(device);
    let mut reader = BufReader::new(rx);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let Ok(command) = Command::parse(&line) else {
            continue;
        };
        let response = hub.handle(&command);
        let frame = response.encode().unwrap();
        if tx.write_all(frame.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Port enumerator backed by a [`MockHub`]
pub struct MockPorts {
    names: Vec<String>,
    hub: MockHub,
}

impl PortConnector for MockPorts {
    fn available_ports(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.names.clone())
    }

    fn open(&self, name: &str, _: &SerialSettings) -> Result<DynSerial, TransportError> {
        if !self.names.iter().any(|n| n == name) {
            return Err(TransportError::Open {
                port: name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such port"),
            });
        }
        let (host, device) = tokio::io::duplex(16 * 1024);
        tokio::spawn(serve(self.hub.clone(), device));
        Ok(Box::new(host))
    }
}

/// Deterministic UID for tests: `seed` repeated in the last byte.
pub fn uid_bytes(seed: u8) -> [u8; 12] {
    let mut uid = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xA0, 0xB0, 0x00];
    uid[11] = seed;
    uid
}
