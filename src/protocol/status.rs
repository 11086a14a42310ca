//! Status codes returned by the hub in `StatusCode` frames.

use std::fmt;

/// First and last code reserved for the bootloader.
const BOOTLOADER_RANGE: std::ops::RangeInclusive<u16> = 0xF000..=0xF0FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Fail,
    Busy,
    Timeout,
    BadData,
    ProtocolError,
    OutOfMemory,
    InvalidArgument,
    BadAddress,
    Forbidden,
    AlreadyExists,
    Unsupported,
    NotImplemented,
    MalformedPackage,
    DeviceOffline,
    NotInitialized,
    I2cError,
    UsartError,
    SpiError,
    /// Code inside the bootloader range (`0xF000..=0xF0FF`)
    Bootloader(u16),
    /// Any code the firmware may add later
    Unknown(u16),
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 0x0000,
            Self::Fail => 0x0001,
            Self::Busy => 0x0003,
            Self::Timeout => 0x0010,
            Self::BadData => 0x0011,
            Self::ProtocolError => 0x0012,
            Self::OutOfMemory => 0x0013,
            Self::InvalidArgument => 0x0014,
            Self::BadAddress => 0x0015,
            Self::Forbidden => 0x0016,
            Self::AlreadyExists => 0x0017,
            Self::Unsupported => 0x0018,
            Self::NotImplemented => 0x0019,
            Self::MalformedPackage => 0x001A,
            Self::DeviceOffline => 0x001B,
            Self::NotInitialized => 0x001C,
            Self::I2cError => 0xE001,
            Self::UsartError => 0xE002,
            Self::SpiError => 0xE003,
            Self::Bootloader(code) | Self::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    fn description(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Fail => "general failure",
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::BadData => "bad data",
            Self::ProtocolError => "protocol error",
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
            Self::BadAddress => "bad address",
            Self::Forbidden => "forbidden",
            Self::AlreadyExists => "already exists",
            Self::Unsupported => "unsupported",
            Self::NotImplemented => "not implemented",
            Self::MalformedPackage => "malformed package",
            Self::DeviceOffline => "device offline",
            Self::NotInitialized => "module not initialized",
            Self::I2cError => "I2C error",
            Self::UsartError => "USART error",
            Self::SpiError => "SPI error",
            Self::Bootloader(_) => "bootloader error",
            Self::Unknown(_) => "unknown status",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        match code {
            0x0000 => Self::Ok,
            0x0001 => Self::Fail,
            0x0003 => Self::Busy,
            0x0010 => Self::Timeout,
            0x0011 => Self::BadData,
            0x0012 => Self::ProtocolError,
            0x0013 => Self::OutOfMemory,
            0x0014 => Self::InvalidArgument,
            0x0015 => Self::BadAddress,
            0x0016 => Self::Forbidden,
            0x0017 => Self::AlreadyExists,
            0x0018 => Self::Unsupported,
            0x0019 => Self::NotImplemented,
            0x001A => Self::MalformedPackage,
            0x001B => Self::DeviceOffline,
            0x001C => Self::NotInitialized,
            0xE001 => Self::I2cError,
            0xE002 => Self::UsartError,
            0xE003 => Self::SpiError,
            c if BOOTLOADER_RANGE.contains(&c) => Self::Bootloader(c),
            c => Self::Unknown(c),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.description(), self.code())
    }
}
