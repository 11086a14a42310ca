//! Dial device store - per-session registry of discovered dials
//!
//! Each dial has:
//! - Permanent UID (12 bytes from the dial MCU, 24 uppercase hex chars)
//! - Ephemeral bus index, reassigned by every rescan / provisioning pass
//! - Cached state (position, backlight, easing, version strings)
//!
//! Only the UID may be persisted by callers. The index map is rebuilt after
//! each discovery and records not seen again lose their index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::protocol::{bytes_to_hex, ProtocolError};

/// Highest bus index the hub hands out
pub const MAX_BUS_INDEX: u8 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid dial UID '{0}': expected 24 hex characters")]
pub struct InvalidDialUid(pub String);

/// Permanent dial identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DialUid(String);

impl DialUid {
    pub const BYTES: usize = 12;

    /// UID from the raw payload of a UID query.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::BYTES {
            return Err(ProtocolError::Malformed(format!(
                "UID must be {} bytes, got {}",
                Self::BYTES,
                bytes.len()
            )));
        }
        Ok(Self(bytes_to_hex(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DialUid {
    type Err = InvalidDialUid;

    /// Accepts either case; stored uppercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == Self::BYTES * 2 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(InvalidDialUid(s.to_string()))
        }
    }
}

impl TryFrom<String> for DialUid {
    type Error = InvalidDialUid;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DialUid> for String {
    fn from(uid: DialUid) -> Self {
        uid.0
    }
}

impl fmt::Display for DialUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGBW backlight, each channel 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlight {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
}

impl Backlight {
    pub const fn rgbw(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white,
        }
    }

    pub const OFF: Self = Self::rgbw(0, 0, 0, 0);

    pub fn clamped(self) -> Self {
        Self {
            red: self.red.min(100),
            green: self.green.min(100),
            blue: self.blue.min(100),
            white: self.white.min(100),
        }
    }
}

/// Needle and backlight easing parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EasingConfig {
    pub dial_step: u32,
    pub dial_period: u32,
    pub backlight_step: u32,
    pub backlight_period: u32,
}

impl EasingConfig {
    pub const WIRE_LEN: usize = 16;

    /// Decode the 16-byte easing response (4 x u32 BE).
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(ProtocolError::Malformed(format!(
                "easing config must be {} bytes, got {}",
                Self::WIRE_LEN,
                payload.len()
            )));
        }
        Ok(Self {
            dial_step: crate::protocol::read_u32_be(payload, 0)?,
            dial_period: crate::protocol::read_u32_be(payload, 4)?,
            backlight_step: crate::protocol::read_u32_be(payload, 8)?,
            backlight_period: crate::protocol::read_u32_be(payload, 12)?,
        })
    }
}

/// Version strings reported by a dial
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub firmware: Option<String>,
    pub hardware: Option<String>,
    pub protocol: Option<String>,
    pub build: Option<String>,
}

/// Registered dial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub uid: DialUid,
    /// Bus index in the current discovery session, if seen
    pub index: Option<u8>,
    pub position: u8,
    pub backlight: Backlight,
    pub easing: Option<EasingConfig>,
    pub info: DeviceInfo,
    pub last_communication: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    fn new(uid: DialUid, index: u8) -> Self {
        Self {
            uid,
            index: Some(index),
            position: 0,
            backlight: Backlight::OFF,
            easing: None,
            info: DeviceInfo::default(),
            last_communication: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.index.is_some()
    }
}

#[derive(Default)]
struct Registry {
    records: HashMap<DialUid, DeviceRecord>,
    index_to_uid: HashMap<u8, DialUid>,
}

/// Dial device store
#[derive(Clone, Default)]
pub struct DialStore {
    inner: Arc<RwLock<Registry>>,
}

impl DialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index map with the `(index, uid)` pairs of a discovery
    /// pass. Known UIDs keep their cached state; unseen records lose their
    /// index. Returns the number of newly created records.
    pub async fn remap(&self, seen: &[(u8, DialUid)]) -> usize {
        let mut registry = self.inner.write().await;
        let Registry {
            records,
            index_to_uid,
        } = &mut *registry;

        index_to_uid.clear();
        for record in records.values_mut() {
            record.index = None;
        }

        let mut created = 0;
        for (index, uid) in seen {
            match records.get_mut(uid) {
                Some(record) => record.index = Some(*index),
                None => {
                    records.insert(uid.clone(), DeviceRecord::new(uid.clone(), *index));
                    created += 1;
                    tracing::info!("Registered new dial: {} at index {}", uid, index);
                }
            }
            index_to_uid.insert(*index, uid.clone());
        }
        created
    }

    /// Current bus index of `uid`.
    pub async fn resolve(&self, uid: &DialUid) -> Option<u8> {
        let registry = self.inner.read().await;
        registry.records.get(uid).and_then(|r| r.index)
    }

    pub async fn get(&self, uid: &DialUid) -> Option<DeviceRecord> {
        let registry = self.inner.read().await;
        registry.records.get(uid).cloned()
    }

    /// All records, ordered by bus index (offline records last)
    pub async fn list(&self) -> Vec<DeviceRecord> {
        let registry = self.inner.read().await;
        let mut records: Vec<DeviceRecord> = registry.records.values().cloned().collect();
        records.sort_by_key(|r| (r.index.is_none(), r.index, r.uid.clone()));
        records
    }

    /// UIDs currently mapped to an index, ordered by index
    pub async fn online_uids(&self) -> Vec<DialUid> {
        let registry = self.inner.read().await;
        let mut pairs: Vec<(u8, DialUid)> = registry
            .index_to_uid
            .iter()
            .map(|(i, u)| (*i, u.clone()))
            .collect();
        pairs.sort_by_key(|(i, _)| *i);
        pairs.into_iter().map(|(_, u)| u).collect()
    }

    /// Apply `f` to the record and stamp its last communication time.
    pub async fn touch<F>(&self, uid: &DialUid, f: F)
    where
        F: FnOnce(&mut DeviceRecord),
    {
        let mut registry = self.inner.write().await;
        if let Some(record) = registry.records.get_mut(uid) {
            f(record);
            record.last_communication = Some(Utc::now());
        }
    }

    pub async fn clear(&self) {
        let mut registry = self.inner.write().await;
        registry.records.clear();
        registry.index_to_uid.clear();
    }
}
