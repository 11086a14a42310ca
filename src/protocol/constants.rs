//! Hub protocol vocabulary: command codes, data-type tags and framing constants.

use std::fmt;

/// Leading marker of every request sent to the hub.
pub const REQUEST_MARKER: u8 = b'>';
/// Leading marker of every response emitted by the hub.
pub const RESPONSE_MARKER: u8 = b'<';
/// Terminator appended by the transport after each request frame.
pub const REQUEST_TERMINATOR: &str = "\r\n";
/// Marker + command (2 hex) + data type (2 hex) + length (4 hex).
pub const HEADER_LEN: usize = 9;
/// Largest payload the 4-hex-digit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 0xFFFF;

/// Command codes understood by the hub firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    SetDialRawSingle = 0x01,
    SetDialRawMultiple = 0x02,
    SetDialPercentSingle = 0x03,
    SetDialPercentMultiple = 0x04,
    CalibrateMax = 0x05,
    CalibrateHalf = 0x06,
    GetDevicesMap = 0x07,
    ProvisionDevices = 0x08,
    ResetAllDevices = 0x09,
    GetDeviceUid = 0x0B,
    RescanBus = 0x0C,
    DialPower = 0x0D,
    DisplayClear = 0x0E,
    DisplayGotoXy = 0x0F,
    DisplayImageData = 0x10,
    DisplayShowImage = 0x11,
    GetRxBufferSize = 0x12,
    SetRgbBacklight = 0x13,
    SetDialEasingStep = 0x14,
    SetDialEasingPeriod = 0x15,
    SetBacklightEasingStep = 0x16,
    SetBacklightEasingPeriod = 0x17,
    GetEasingConfig = 0x18,
    GetFirmwareInfo = 0x20,
    GetHardwareInfo = 0x21,
    GetProtocolInfo = 0x22,
    GetBuildInfo = 0x23,
}

impl CommandCode {
    pub const ALL: [CommandCode; 27] = [
        Self::SetDialRawSingle,
        Self::SetDialRawMultiple,
        Self::SetDialPercentSingle,
        Self::SetDialPercentMultiple,
        Self::CalibrateMax,
        Self::CalibrateHalf,
        Self::GetDevicesMap,
        Self::ProvisionDevices,
        Self::ResetAllDevices,
        Self::GetDeviceUid,
        Self::RescanBus,
        Self::DialPower,
        Self::DisplayClear,
        Self::DisplayGotoXy,
        Self::DisplayImageData,
        Self::DisplayShowImage,
        Self::GetRxBufferSize,
        Self::SetRgbBacklight,
        Self::SetDialEasingStep,
        Self::SetDialEasingPeriod,
        Self::SetBacklightEasingStep,
        Self::SetBacklightEasingPeriod,
        Self::GetEasingConfig,
        Self::GetFirmwareInfo,
        Self::GetHardwareInfo,
        Self::GetProtocolInfo,
        Self::GetBuildInfo,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a known command code; unknown bytes yield `None`.
    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_u8() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetDialRawSingle => "set_dial_raw_single",
            Self::SetDialRawMultiple => "set_dial_raw_multiple",
            Self::SetDialPercentSingle => "set_dial_percent_single",
            Self::SetDialPercentMultiple => "set_dial_percent_multiple",
            Self::CalibrateMax => "calibrate_max",
            Self::CalibrateHalf => "calibrate_half",
            Self::GetDevicesMap => "get_devices_map",
            Self::ProvisionDevices => "provision_devices",
            Self::ResetAllDevices => "reset_all_devices",
            Self::GetDeviceUid => "get_device_uid",
            Self::RescanBus => "rescan_bus",
            Self::DialPower => "dial_power",
            Self::DisplayClear => "display_clear",
            Self::DisplayGotoXy => "display_goto_xy",
            Self::DisplayImageData => "display_image_data",
            Self::DisplayShowImage => "display_show_image",
            Self::GetRxBufferSize => "get_rx_buffer_size",
            Self::SetRgbBacklight => "set_rgb_backlight",
            Self::SetDialEasingStep => "set_dial_easing_step",
            Self::SetDialEasingPeriod => "set_dial_easing_period",
            Self::SetBacklightEasingStep => "set_backlight_easing_step",
            Self::SetBacklightEasingPeriod => "set_backlight_easing_period",
            Self::GetEasingConfig => "get_easing_config",
            Self::GetFirmwareInfo => "get_firmware_info",
            Self::GetHardwareInfo => "get_hardware_info",
            Self::GetProtocolInfo => "get_protocol_info",
            Self::GetBuildInfo => "get_build_info",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

/// Payload data-type tag carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    None = 0x01,
    SingleValue = 0x02,
    MultipleValue = 0x03,
    KeyValuePair = 0x04,
    StatusCode = 0x05,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        Self::None,
        Self::SingleValue,
        Self::MultipleValue,
        Self::KeyValuePair,
        Self::StatusCode,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_u8() == tag)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::SingleValue => "single_value",
            Self::MultipleValue => "multiple_value",
            Self::KeyValuePair => "key_value_pair",
            Self::StatusCode => "status_code",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_are_unique() {
        for (i, a) in CommandCode::ALL.iter().enumerate() {
            for b in &CommandCode::ALL[i + 1..] {
                assert_ne!(a.as_u8(), b.as_u8(), "{} collides with {}", a, b);
            }
        }
    }

    #[test]
    fn test_command_code_lookup() {
        assert_eq!(CommandCode::from_u8(0x03), Some(CommandCode::SetDialPercentSingle));
        assert_eq!(CommandCode::from_u8(0x0C), Some(CommandCode::RescanBus));
        assert_eq!(CommandCode::from_u8(0xFE), None);
    }

    #[test]
    fn test_data_type_lookup() {
        for tag in DataType::ALL {
            assert_eq!(DataType::from_u8(tag.as_u8()), Some(tag));
        }
        assert_eq!(DataType::from_u8(0x00), None);
        assert_eq!(DataType::from_u8(0x06), None);
    }
}
