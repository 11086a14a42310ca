//! Dial controller - discovery, provisioning and typed command wrappers
//!
//! Every mutating call resolves the dial's UID to its current bus index
//! first; the index is never exposed to callers.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::image::{self, ImageError, MAX_CHUNK_LEN};
use super::store::{Backlight, DeviceInfo, DeviceRecord, DialStore, DialUid, EasingConfig, MAX_BUS_INDEX};
use crate::bus::{BusEvent, SharedBus};
use crate::protocol::{decode_ascii, read_u16_be, Command, CommandCode};
use crate::transport::{
    SerialTransport, TransportError, BUS_TIMEOUT, IMAGE_CHUNK_TIMEOUT, QUERY_TIMEOUT, WRITE_TIMEOUT,
};

/// Provisioning attempts per discovery pass
pub const PROVISION_ATTEMPTS: u32 = 3;
const DEFAULT_PROVISION_DELAY: Duration = Duration::from_millis(200);
/// Pause between image chunks so the hub can relay each one over I2C
const IMAGE_CHUNK_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum DialError {
    #[error("dial {0} is not mapped to a bus index")]
    DeviceNotFound(DialUid),

    #[error("easing update for {uid} stopped at {field}: {source}")]
    EasingIncomplete {
        uid: DialUid,
        field: &'static str,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl From<crate::protocol::ProtocolError> for DialError {
    fn from(e: crate::protocol::ProtocolError) -> Self {
        Self::Transport(TransportError::Protocol(e))
    }
}

/// High-level access to the dials behind one hub.
#[derive(Clone)]
pub struct DialController {
    transport: Arc<SerialTransport>,
    store: DialStore,
    bus: SharedBus,
    provision_delay: Duration,
}

impl DialController {
    pub fn new(transport: Arc<SerialTransport>, store: DialStore, bus: SharedBus) -> Self {
        Self {
            transport,
            store,
            bus,
            provision_delay: DEFAULT_PROVISION_DELAY,
        }
    }

    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = delay;
        self
    }

    pub fn store(&self) -> &DialStore {
        &self.store
    }

    pub fn transport(&self) -> &Arc<SerialTransport> {
        &self.transport
    }

    async fn index_of(&self, uid: &DialUid) -> Result<u8, DialError> {
        self.store
            .resolve(uid)
            .await
            .ok_or_else(|| DialError::DeviceNotFound(uid.clone()))
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Run a discovery pass. Returns true if at least one dial was found.
    pub async fn discover(&self) -> bool {
        match self.try_discover().await {
            Ok(uids) if uids.is_empty() => {
                warn!("Discovery finished but no dials are online");
                false
            }
            Ok(uids) => {
                info!("Discovery found {} dial(s)", uids.len());
                true
            }
            Err(e) => {
                warn!("Discovery failed: {}", e);
                false
            }
        }
    }

    /// Rescan, provision, map indices to UIDs and schedule info fetches.
    pub async fn try_discover(&self) -> Result<Vec<DialUid>, DialError> {
        self.transport
            .send(&Command::bare(CommandCode::RescanBus), BUS_TIMEOUT)
            .await?;

        for attempt in 1..=PROVISION_ATTEMPTS {
            match self
                .transport
                .send(&Command::bare(CommandCode::ProvisionDevices), BUS_TIMEOUT)
                .await
            {
                Ok(()) => {
                    debug!("Provisioning succeeded on attempt {}", attempt);
                    break;
                }
                Err(e) => {
                    warn!("Provisioning attempt {}/{} failed: {}", attempt, PROVISION_ATTEMPTS, e);
                    if attempt < PROVISION_ATTEMPTS {
                        tokio::time::sleep(self.provision_delay).await;
                    }
                }
            }
        }

        let flags = self
            .transport
            .query(&Command::bare(CommandCode::GetDevicesMap), QUERY_TIMEOUT)
            .await?;

        let mut seen = Vec::new();
        for (index, _) in flags
            .iter()
            .enumerate()
            .filter(|(i, flag)| **flag != 0 && *i <= MAX_BUS_INDEX as usize)
        {
            let index = index as u8;
            match self.query_uid(index).await {
                Ok(uid) => seen.push((index, uid)),
                Err(e) => warn!("Could not read UID of dial at index {}: {}", index, e),
            }
        }

        let created = self.store.remap(&seen).await;
        let uids = self.store.online_uids().await;
        debug!("Mapped {} dial(s), {} new", uids.len(), created);

        self.bus.publish(BusEvent::DevicesDiscovered { uids: uids.clone() });

        // Version strings and easing are informational; fetch them off the
        // discovery path and only log failures.
        let controller = self.clone();
        let pending = uids.clone();
        tokio::spawn(async move {
            for uid in pending {
                if let Err(e) = controller.refresh_device_info(&uid).await {
                    warn!("Background info fetch for {} failed: {}", uid, e);
                }
            }
        });

        Ok(uids)
    }

    async fn query_uid(&self, index: u8) -> Result<DialUid, DialError> {
        let payload = self
            .transport
            .query(&Command::single(CommandCode::GetDeviceUid, index), QUERY_TIMEOUT)
            .await?;
        Ok(DialUid::from_bytes(&payload)?)
    }

    // =========================================================================
    // Needle
    // =========================================================================

    /// Move the needle to `percent` (clamped to 100).
    pub async fn set_position(&self, uid: &DialUid, percent: u8) -> Result<(), DialError> {
        let percent = percent.min(100);
        let index = self.index_of(uid).await?;
        self.transport
            .send(
                &Command::key_value(CommandCode::SetDialPercentSingle, index, &[percent]),
                WRITE_TIMEOUT,
            )
            .await?;
        self.store.touch(uid, |r| r.position = percent).await;
        Ok(())
    }

    /// Move the needle to a raw DAC value.
    pub async fn set_position_raw(&self, uid: &DialUid, raw: u16) -> Result<(), DialError> {
        let index = self.index_of(uid).await?;
        self.transport
            .send(
                &Command::key_value(CommandCode::SetDialRawSingle, index, &raw.to_be_bytes()),
                WRITE_TIMEOUT,
            )
            .await?;
        self.store.touch(uid, |_| {}).await;
        Ok(())
    }

    /// Move several needles in one command. Fails before sending if any UID
    /// is unmapped.
    pub async fn set_positions(&self, targets: &[(DialUid, u8)]) -> Result<(), DialError> {
        let mut payload = Vec::with_capacity(targets.len() * 2);
        for (uid, percent) in targets {
            payload.push(self.index_of(uid).await?);
            payload.push((*percent).min(100));
        }
        self.transport
            .send(
                &Command::multiple(CommandCode::SetDialPercentMultiple, payload),
                WRITE_TIMEOUT,
            )
            .await?;
        for (uid, percent) in targets {
            let percent = (*percent).min(100);
            self.store.touch(uid, |r| r.position = percent).await;
        }
        Ok(())
    }

    pub async fn calibrate_max(&self, uid: &DialUid, raw: u16) -> Result<(), DialError> {
        self.calibrate(uid, CommandCode::CalibrateMax, raw).await
    }

    pub async fn calibrate_half(&self, uid: &DialUid, raw: u16) -> Result<(), DialError> {
        self.calibrate(uid, CommandCode::CalibrateHalf, raw).await
    }

    async fn calibrate(&self, uid: &DialUid, code: CommandCode, raw: u16) -> Result<(), DialError> {
        let index = self.index_of(uid).await?;
        self.transport
            .send(&Command::key_value(code, index, &raw.to_be_bytes()), WRITE_TIMEOUT)
            .await?;
        info!("Calibrated {} ({}) at raw {}", uid, code.name(), raw);
        self.store.touch(uid, |_| {}).await;
        Ok(())
    }

    // =========================================================================
    // Backlight & easing
    // =========================================================================

    pub async fn set_backlight(&self, uid: &DialUid, color: Backlight) -> Result<(), DialError> {
        let color = color.clamped();
        let index = self.index_of(uid).await?;
        self.transport
            .send(
                &Command::key_value(
                    CommandCode::SetRgbBacklight,
                    index,
                    &[color.red, color.green, color.blue, color.white],
                ),
                WRITE_TIMEOUT,
            )
            .await?;
        self.store.touch(uid, |r| r.backlight = color).await;
        Ok(())
    }

    /// Write all four easing fields. The cached config changes only if every
    /// write succeeds.
    pub async fn set_easing(&self, uid: &DialUid, easing: EasingConfig) -> Result<(), DialError> {
        let index = self.index_of(uid).await?;
        let fields = [
            ("dial step", CommandCode::SetDialEasingStep, easing.dial_step),
            ("dial period", CommandCode::SetDialEasingPeriod, easing.dial_period),
            ("backlight step", CommandCode::SetBacklightEasingStep, easing.backlight_step),
            ("backlight period", CommandCode::SetBacklightEasingPeriod, easing.backlight_period),
        ];

        for (field, code, value) in fields {
            self.transport
                .send(&Command::key_value(code, index, &value.to_be_bytes()), WRITE_TIMEOUT)
                .await
                .map_err(|source| DialError::EasingIncomplete {
                    uid: uid.clone(),
                    field,
                    source,
                })?;
        }

        self.store.touch(uid, |r| r.easing = Some(easing)).await;
        Ok(())
    }

    pub async fn get_easing(&self, uid: &DialUid) -> Result<EasingConfig, DialError> {
        let index = self.index_of(uid).await?;
        let payload = self
            .transport
            .query(&Command::single(CommandCode::GetEasingConfig, index), QUERY_TIMEOUT)
            .await?;
        let easing = EasingConfig::from_payload(&payload)?;
        self.store.touch(uid, |r| r.easing = Some(easing)).await;
        Ok(easing)
    }

    // =========================================================================
    // Hub-wide
    // =========================================================================

    pub async fn dial_power(&self, on: bool) -> Result<(), DialError> {
        self.transport
            .send(&Command::single(CommandCode::DialPower, u8::from(on)), BUS_TIMEOUT)
            .await?;
        info!("Dial power {}", if on { "on" } else { "off" });
        Ok(())
    }

    pub async fn reset_all(&self) -> Result<(), DialError> {
        self.transport
            .send(&Command::bare(CommandCode::ResetAllDevices), BUS_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Size of the hub's receive buffer in bytes.
    pub async fn rx_buffer_size(&self) -> Result<u16, DialError> {
        let payload = self
            .transport
            .query(&Command::bare(CommandCode::GetRxBufferSize), QUERY_TIMEOUT)
            .await?;
        Ok(read_u16_be(&payload)?)
    }

    // =========================================================================
    // Display
    // =========================================================================

    pub async fn clear_display(&self, uid: &DialUid, fill: u8) -> Result<(), DialError> {
        let index = self.index_of(uid).await?;
        self.transport
            .send(&Command::key_value(CommandCode::DisplayClear, index, &[fill]), WRITE_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn display_goto(&self, index: u8, x: u16, y: u16) -> Result<(), DialError> {
        let mut value = Vec::with_capacity(4);
        value.extend_from_slice(&x.to_be_bytes());
        value.extend_from_slice(&y.to_be_bytes());
        self.transport
            .send(&Command::key_value(CommandCode::DisplayGotoXy, index, &value), WRITE_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Transfer a packed 3600-byte frame and show it.
    pub async fn send_image(&self, uid: &DialUid, frame: &[u8]) -> Result<(), DialError> {
        let chunks = image::chunk_frame(frame, MAX_CHUNK_LEN)?;
        let index = self.index_of(uid).await?;

        self.display_goto(index, 0, 0).await?;
        let total = chunks.len();
        for (n, chunk) in chunks.into_iter().enumerate() {
            self.transport
                .send(
                    &Command::key_value(CommandCode::DisplayImageData, index, chunk),
                    IMAGE_CHUNK_TIMEOUT,
                )
                .await?;
            debug!("Sent image chunk {}/{} ({} bytes) to {}", n + 1, total, chunk.len(), uid);
            if n + 1 < total {
                tokio::time::sleep(IMAGE_CHUNK_PAUSE).await;
            }
        }
        self.display_goto(index, 0, 0).await?;
        self.transport
            .send(&Command::single(CommandCode::DisplayShowImage, index), WRITE_TIMEOUT)
            .await?;

        self.store.touch(uid, |_| {}).await;
        Ok(())
    }

    /// Decode an encoded image (PNG, JPEG, ...) and show it.
    pub async fn send_image_file(&self, uid: &DialUid, image_data: &[u8]) -> Result<(), DialError> {
        let frame = image::image_bytes_to_frame(image_data, image::DEFAULT_THRESHOLD)?;
        self.send_image(uid, &frame).await
    }

    // =========================================================================
    // Info
    // =========================================================================

    async fn query_string(&self, code: CommandCode, index: u8) -> Result<String, DialError> {
        let payload = self
            .transport
            .query(&Command::single(code, index), QUERY_TIMEOUT)
            .await?;
        Ok(decode_ascii(&payload)?)
    }

    /// Re-read version strings and easing config. Individual query failures
    /// leave that field unset.
    pub async fn refresh_device_info(&self, uid: &DialUid) -> Result<DeviceInfo, DialError> {
        let index = self.index_of(uid).await?;

        let mut info = DeviceInfo::default();
        for (code, slot) in [
            (CommandCode::GetFirmwareInfo, &mut info.firmware),
            (CommandCode::GetHardwareInfo, &mut info.hardware),
            (CommandCode::GetProtocolInfo, &mut info.protocol),
            (CommandCode::GetBuildInfo, &mut info.build),
        ] {
            match self.query_string(code, index).await {
                Ok(value) => *slot = Some(value),
                Err(e) => debug!("{} for {} failed: {}", code.name(), uid, e),
            }
        }

        let cached = info.clone();
        self.store.touch(uid, move |r| r.info = cached).await;

        if let Err(e) = self.get_easing(uid).await {
            debug!("Easing query for {} failed: {}", uid, e);
        }
        Ok(info)
    }

    pub async fn list(&self) -> Vec<DeviceRecord> {
        self.store.list().await
    }
}
