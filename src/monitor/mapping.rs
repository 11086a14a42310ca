//! Sensor-to-dial mappings
//!
//! A mapping ties one dial UID to a sensor selector and the transform from
//! the sensor value to needle percentage and backlight color.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::dials::{Backlight, DialUid};
use crate::sensors::SensorReading;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no reading matches {0}")]
    NoMatch(String),

    #[error("unknown color '{0}'")]
    UnknownColor(String),

    #[error("sensor provider is disconnected")]
    ProviderDisconnected,
}

// =============================================================================
// DialColor
// =============================================================================

/// Named backlight colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DialColor {
    Off,
    White,
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
    Orange,
    Purple,
    Pink,
}

impl DialColor {
    pub const ALL: [DialColor; 11] = [
        Self::Off,
        Self::White,
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Yellow,
        Self::Cyan,
        Self::Magenta,
        Self::Orange,
        Self::Purple,
        Self::Pink,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::White => "white",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Cyan => "cyan",
            Self::Magenta => "magenta",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Pink => "pink",
        }
    }

    /// RGBW channel levels (0-100)
    pub fn backlight(self) -> Backlight {
        match self {
            Self::Off => Backlight::rgbw(0, 0, 0, 0),
            Self::White => Backlight::rgbw(0, 0, 0, 100),
            Self::Red => Backlight::rgbw(100, 0, 0, 0),
            Self::Green => Backlight::rgbw(0, 100, 0, 0),
            Self::Blue => Backlight::rgbw(0, 0, 100, 0),
            Self::Yellow => Backlight::rgbw(100, 100, 0, 0),
            Self::Cyan => Backlight::rgbw(0, 100, 100, 0),
            Self::Magenta => Backlight::rgbw(100, 0, 100, 0),
            Self::Orange => Backlight::rgbw(100, 50, 0, 0),
            Self::Purple => Backlight::rgbw(50, 0, 100, 0),
            Self::Pink => Backlight::rgbw(100, 40, 70, 0),
        }
    }
}

impl fmt::Display for DialColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DialColor {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MappingError::UnknownColor(s.to_string()))
    }
}

impl TryFrom<String> for DialColor {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DialColor> for String {
    fn from(color: DialColor) -> Self {
        color.name().to_string()
    }
}

// =============================================================================
// ColorMode
// =============================================================================

/// How a mapping colors its dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ColorMode {
    /// Normal / warning / critical colors chosen by thresholds
    Threshold {
        normal: DialColor,
        warning: DialColor,
        critical: DialColor,
    },
    /// Fixed color; thresholds are never evaluated
    Static { color: DialColor },
    /// No color commands at all
    Off,
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Threshold {
            normal: DialColor::Green,
            warning: DialColor::Yellow,
            critical: DialColor::Red,
        }
    }
}

impl ColorMode {
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static { .. })
    }
}

// =============================================================================
// SensorSelector
// =============================================================================

/// Which reading drives a dial.
///
/// Matching tries, in order: sensor id + instance + entry id; sensor id +
/// instance + entry name; sensor name + entry name (case-insensitive). The
/// first tier with a hit wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSelector {
    pub sensor_id: Option<u32>,
    pub sensor_instance: Option<u32>,
    pub entry_id: Option<u32>,
    pub sensor_name: Option<String>,
    pub entry_name: Option<String>,
}

impl SensorSelector {
    pub fn find<'a>(&self, readings: &'a [SensorReading]) -> Option<&'a SensorReading> {
        if let (Some(sensor_id), Some(instance), Some(entry_id)) =
            (self.sensor_id, self.sensor_instance, self.entry_id)
        {
            let hit = readings.iter().find(|r| {
                r.sensor_id == sensor_id && r.sensor_instance == instance && r.entry_id == entry_id
            });
            if hit.is_some() {
                return hit;
            }
        }

        if let (Some(sensor_id), Some(instance), Some(entry_name)) =
            (self.sensor_id, self.sensor_instance, self.entry_name.as_deref())
        {
            let hit = readings.iter().find(|r| {
                r.sensor_id == sensor_id
                    && r.sensor_instance == instance
                    && r.entry_name == entry_name
            });
            if hit.is_some() {
                return hit;
            }
        }

        if let (Some(sensor_name), Some(entry_name)) =
            (self.sensor_name.as_deref(), self.entry_name.as_deref())
        {
            return readings.iter().find(|r| {
                r.sensor_name.eq_ignore_ascii_case(sensor_name)
                    && r.entry_name.eq_ignore_ascii_case(entry_name)
            });
        }

        None
    }
}

impl fmt::Display for SensorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sensor_id, self.entry_id) {
            (Some(sid), Some(eid)) => write!(
                f,
                "sensor {}#{} entry {}",
                sid,
                self.sensor_instance.unwrap_or(0),
                eid
            ),
            _ => write!(
                f,
                "{} / {}",
                self.sensor_name.as_deref().unwrap_or("?"),
                self.entry_name.as_deref().unwrap_or("?")
            ),
        }
    }
}

// =============================================================================
// SensorMapping
// =============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMapping {
    pub dial_uid: DialUid,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub sensor: SensorSelector,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub warning: Option<f64>,
    #[serde(default)]
    pub critical: Option<f64>,
    #[serde(default)]
    pub color: ColorMode,
}

impl SensorMapping {
    pub fn resolve<'a>(&self, readings: &'a [SensorReading]) -> Result<&'a SensorReading, MappingError> {
        self.sensor
            .find(readings)
            .ok_or_else(|| MappingError::NoMatch(self.sensor.to_string()))
    }

    pub fn percentage(&self, value: f64) -> u8 {
        compute_percentage(value, self.min, self.max)
    }

    pub fn color_for(&self, value: f64) -> Option<DialColor> {
        select_color(&self.color, value, self.warning, self.critical)
    }
}

/// `clamp((value - min) / (max - min), 0, 1) * 100`, rounded. A degenerate
/// range (`max <= min`) or a NaN value yields 0.
pub fn compute_percentage(value: f64, min: f64, max: f64) -> u8 {
    if max <= min || value.is_nan() {
        return 0;
    }
    let ratio = ((value - min) / (max - min)).clamp(0.0, 1.0);
    (ratio * 100.0).round() as u8
}

/// Color for `value` under `mode`; `None` means no color command.
pub fn select_color(
    mode: &ColorMode,
    value: f64,
    warning: Option<f64>,
    critical: Option<f64>,
) -> Option<DialColor> {
    match mode {
        ColorMode::Threshold {
            normal,
            warning: warning_color,
            critical: critical_color,
        } => {
            if critical.is_some_and(|c| value >= c) {
                Some(*critical_color)
            } else if warning.is_some_and(|w| value >= w) {
                Some(*warning_color)
            } else {
                Some(*normal)
            }
        }
        ColorMode::Static { color } => Some(*color),
        ColorMode::Off => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SensorCategory;

    fn reading(sensor_id: u32, instance: u32, sensor: &str, entry_id: u32, entry: &str, value: f64) -> SensorReading {
        SensorReading {
            sensor_id,
            sensor_instance: instance,
            sensor_name: sensor.to_string(),
            entry_id,
            entry_name: entry.to_string(),
            value,
            unit: String::new(),
            category: SensorCategory::Temperature,
        }
    }

    fn mapping(min: f64, max: f64, warning: Option<f64>, critical: Option<f64>) -> SensorMapping {
        SensorMapping {
            dial_uid: DialUid::from_bytes(&[1; 12]).unwrap(),
            enabled: true,
            sensor: SensorSelector::default(),
            min,
            max,
            warning,
            critical,
            color: ColorMode::default(),
        }
    }

    #[test]
    fn test_percentage_bounds_and_monotonic() {
        assert_eq!(compute_percentage(-10.0, 0.0, 100.0), 0);
        assert_eq!(compute_percentage(0.0, 0.0, 100.0), 0);
        assert_eq!(compute_percentage(100.0, 0.0, 100.0), 100);
        assert_eq!(compute_percentage(250.0, 0.0, 100.0), 100);

        let mut last = 0;
        for step in 0..=200 {
            let v = 20.0 + step as f64 * 0.5;
            let p = compute_percentage(v, 20.0, 95.0);
            assert!(p <= 100);
            assert!(p >= last, "not monotonic at {}", v);
            last = p;
        }
    }

    #[test]
    fn test_degenerate_range_is_zero() {
        assert_eq!(compute_percentage(50.0, 80.0, 80.0), 0);
        assert_eq!(compute_percentage(50.0, 90.0, 10.0), 0);
        assert_eq!(compute_percentage(f64::NAN, 0.0, 100.0), 0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(compute_percentage(60.0, 0.0, 80.0), 75);
        assert_eq!(compute_percentage(1.0, 0.0, 3.0), 33);
        assert_eq!(compute_percentage(2.0, 0.0, 3.0), 67);
    }

    #[test]
    fn test_threshold_scenario_57_5() {
        let m = mapping(20.0, 95.0, Some(75.0), Some(88.0));
        assert_eq!(m.percentage(57.5), 50);
        assert_eq!(m.color_for(57.5), Some(DialColor::Green));
    }

    #[test]
    fn test_critical_wins_over_warning() {
        // Even with warning above critical, critical takes precedence
        let m = mapping(0.0, 100.0, Some(95.0), Some(80.0));
        for v in [80.0, 90.0, 99.0, 150.0] {
            assert_eq!(m.color_for(v), Some(DialColor::Red), "value {}", v);
        }
        let m = mapping(0.0, 100.0, Some(60.0), Some(80.0));
        assert_eq!(m.color_for(60.0), Some(DialColor::Yellow));
        assert_eq!(m.color_for(59.9), Some(DialColor::Green));
    }

    #[test]
    fn test_static_and_off_modes() {
        let mut m = mapping(0.0, 100.0, Some(10.0), Some(20.0));
        m.color = ColorMode::Static {
            color: DialColor::Blue,
        };
        assert_eq!(m.color_for(99.0), Some(DialColor::Blue));
        assert!(m.color.is_static());

        m.color = ColorMode::Off;
        assert_eq!(m.color_for(99.0), None);
    }

    #[test]
    fn test_color_lookup_total() {
        for color in DialColor::ALL {
            assert_eq!(color.name().parse::<DialColor>().unwrap(), color);
        }
        assert_eq!("  ReD ".parse::<DialColor>().unwrap(), DialColor::Red);
        assert_eq!(
            "chartreuse".parse::<DialColor>(),
            Err(MappingError::UnknownColor("chartreuse".to_string()))
        );
        assert_eq!(DialColor::Orange.backlight(), Backlight::rgbw(100, 50, 0, 0));
    }

    #[test]
    fn test_selector_tiers() {
        let readings = vec![
            reading(1, 0, "CPU", 10, "Package", 50.0),
            reading(1, 0, "CPU", 11, "Core Max", 60.0),
            reading(2, 0, "GPU", 10, "Package", 70.0),
        ];

        // Tier 1: exact ids
        let sel = SensorSelector {
            sensor_id: Some(1),
            sensor_instance: Some(0),
            entry_id: Some(11),
            entry_name: Some("Package".to_string()),
            ..Default::default()
        };
        assert_eq!(sel.find(&readings).unwrap().value, 60.0);

        // Tier 2: stale entry id, name still matches
        let sel = SensorSelector {
            sensor_id: Some(2),
            sensor_instance: Some(0),
            entry_id: Some(99),
            entry_name: Some("Package".to_string()),
            ..Default::default()
        };
        assert_eq!(sel.find(&readings).unwrap().value, 70.0);

        // Tier 3: names only, case-insensitive
        let sel = SensorSelector {
            sensor_name: Some("cpu".to_string()),
            entry_name: Some("core max".to_string()),
            ..Default::default()
        };
        assert_eq!(sel.find(&readings).unwrap().value, 60.0);

        let sel = SensorSelector {
            sensor_name: Some("NVMe".to_string()),
            entry_name: Some("Temp".to_string()),
            ..Default::default()
        };
        assert!(sel.find(&readings).is_none());
        let mut m = mapping(0.0, 1.0, None, None);
        m.sensor = sel;
        assert!(matches!(m.resolve(&readings), Err(MappingError::NoMatch(_))));
    }

    #[test]
    fn test_mapping_deserialize() {
        let json = r#"{
            "dial_uid": "0102030405060708090A0B0C",
            "sensor": {"sensor_name": "CPU", "entry_name": "Package"},
            "min": 20, "max": 95, "warning": 75, "critical": 88,
            "color": {"mode": "threshold", "normal": "green", "warning": "orange", "critical": "red"}
        }"#;
        let m: SensorMapping = serde_json::from_str(json).unwrap();
        assert!(m.enabled);
        assert_eq!(m.critical, Some(88.0));
        assert_eq!(
            m.color,
            ColorMode::Threshold {
                normal: DialColor::Green,
                warning: DialColor::Orange,
                critical: DialColor::Red
            }
        );

        let bad = json.replace("orange", "infrared");
        assert!(serde_json::from_str::<SensorMapping>(&bad).is_err());

        let off: SensorMapping = serde_json::from_str(
            r#"{"dial_uid":"0102030405060708090A0B0C","enabled":false,"sensor":{},"min":0,"max":1,"color":{"mode":"off"}}"#,
        )
        .unwrap();
        assert!(!off.enabled);
        assert_eq!(off.color, ColorMode::Off);
    }
}
