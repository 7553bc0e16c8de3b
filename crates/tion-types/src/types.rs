//! Core types for breezer state.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FieldError;

/// Highest fan speed accepted by any supported breezer.
pub const MAX_FAN_SPEED: u8 = 6;

/// Supported breezer families.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new models
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum DeviceModel {
    /// Tion Lite: multi-packet framed protocol.
    Lite,
    /// Tion S3: single-packet protocol.
    S3,
}

impl DeviceModel {
    /// GATT service exposing the breezer's control characteristics.
    #[must_use]
    pub fn service_uuid(&self) -> uuid::Uuid {
        match self {
            DeviceModel::Lite => crate::uuid::LITE_SERVICE,
            DeviceModel::S3 => crate::uuid::S3_SERVICE,
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceModel::Lite => write!(f, "Tion Lite"),
            DeviceModel::S3 => write!(f, "Tion S3"),
        }
    }
}

impl FromStr for DeviceModel {
    type Err = FieldError;

    /// Parse a model name (case-insensitive, optional "tion" prefix).
    ///
    /// ```
    /// use tion_types::DeviceModel;
    ///
    /// assert_eq!("lite".parse::<DeviceModel>().unwrap(), DeviceModel::Lite);
    /// assert_eq!("Tion S3".parse::<DeviceModel>().unwrap(), DeviceModel::S3);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let name = lower.strip_prefix("tion").unwrap_or(lower.as_str()).trim();
        match name {
            "lite" => Ok(DeviceModel::Lite),
            "s3" => Ok(DeviceModel::S3),
            _ => Err(FieldError::invalid("model", format!("unknown model '{}'", s))),
        }
    }
}

/// Air intake mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum Mode {
    /// Indoor air only.
    Recirculation,
    /// Indoor and outdoor air.
    Mixed,
    /// Outdoor air only.
    Outside,
    /// The device reported a mode this library does not know.
    #[default]
    Unknown,
}

impl Mode {
    /// Wire value used by both variants (`Unknown` is sent as outside).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Mode::Recirculation => 0,
            Mode::Mixed => 1,
            Mode::Outside | Mode::Unknown => 2,
        }
    }

    /// Decode a mode byte, mapping unknown values to [`Mode::Unknown`].
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Mode::Recirculation,
            1 => Mode::Mixed,
            2 => Mode::Outside,
            _ => Mode::Unknown,
        }
    }

    /// Lowercase name as used in update mappings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Recirculation => "recirculation",
            Mode::Mixed => "mixed",
            Mode::Outside => "outside",
            Mode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recirculation" => Ok(Mode::Recirculation),
            "mixed" => Ok(Mode::Mixed),
            "outside" => Ok(Mode::Outside),
            other => Err(FieldError::invalid(
                "mode",
                format!("expected recirculation, mixed or outside, got '{}'", other),
            )),
        }
    }
}

/// Preset steps transmitted with every Lite `SetParams` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Presets {
    /// Heater target temperature steps.
    pub temperatures: [u8; 3],
    /// Fan speed steps.
    pub fan_speeds: [u8; 3],
}

impl Presets {
    /// Presets as observed in every captured Lite exchange.
    pub const FACTORY: Presets = Presets {
        temperatures: [0x0A, 0x14, 0x19],
        fan_speeds: [0x02, 0x04, 0x06],
    };

    /// Wire order: temperatures then fan speeds.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 6] {
        let [t0, t1, t2] = self.temperatures;
        let [f0, f1, f2] = self.fan_speeds;
        [t0, t1, t2, f0, f1, f2]
    }
}

impl Default for Presets {
    fn default() -> Self {
        Self::FACTORY
    }
}

/// Render a device flag the way the breezer firmware documents it.
///
/// ```
/// use tion_types::{decode_flag, encode_flag};
///
/// assert_eq!(decode_flag(true), "on");
/// assert_eq!(encode_flag(decode_flag(false)), Some(false));
/// ```
#[must_use]
pub fn decode_flag(bit: bool) -> &'static str {
    if bit { "on" } else { "off" }
}

/// Parse an `"on"`/`"off"` flag. Anything else yields `None`.
#[must_use]
pub fn encode_flag(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Fields reported by the device that cannot be written.
pub const READ_ONLY_FIELDS: &[&str] = &[
    "heater_present",
    "in_temp",
    "out_temp",
    "electronics_temp",
    "filter_remaining_pct",
    "filter_remaining_days",
    "filter_used_days",
    "filter_change_required",
    "device_work_time_days",
    "electronics_work_time_days",
    "error_code",
    "firmware_version",
    "co2_auto",
    "presets",
    "max_fan_speed",
    "heater_percent",
    "timer",
    "device_time",
    "productivity",
    "has_valid_state",
];

/// Last known state of a breezer together with the pending write intent.
///
/// The session keeps one of these per device. Fields a given model does not
/// report keep their previous value across reads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    /// Fan running.
    pub power: bool,
    /// Button sounds enabled.
    pub sound: bool,
    /// Indicator light enabled.
    pub light: bool,
    /// Heater enabled.
    pub heater: bool,
    /// Device has a heater installed.
    pub heater_present: bool,
    /// Air intake mode.
    pub mode: Mode,
    /// Fan speed (0-6).
    pub fan_speed: u8,
    /// Heater target temperature in °C.
    pub target_temp: i16,
    /// Inlet air temperature in °C.
    pub in_temp: i16,
    /// Outlet air temperature in °C.
    pub out_temp: i16,
    /// Filter life reported by Lite devices.
    pub filter_remaining_pct: f32,
    /// Total device work time in days (Lite).
    pub device_work_time_days: f32,
    /// Device error code (0 = no error).
    pub error_code: u8,
    /// Firmware version as four hex digits.
    pub firmware_version: String,
    /// True only after a successful read from the device.
    pub has_valid_state: bool,

    // Lite telemetry.
    /// Filter needs replacing.
    pub filter_change_required: bool,
    /// Fan speed follows the CO2 sensor.
    pub co2_auto: bool,
    /// Control board temperature in °C.
    pub electronics_temp: i16,
    /// Control board work time in days.
    pub electronics_work_time_days: f32,
    /// Days the current filter has been in use.
    pub filter_used_days: f32,
    /// Preset target temperatures and fan speeds.
    pub presets: Presets,
    /// Highest fan speed the device accepts.
    pub max_fan_speed: u8,
    /// Heater power in percent.
    pub heater_percent: u8,

    // S3 telemetry.
    /// Timer running.
    pub timer: bool,
    /// Device clock, hours and minutes.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub device_time: Option<time::Time>,
    /// Airflow productivity code.
    pub productivity: u8,
    /// Filter life left in days (S3).
    pub filter_remaining_days: f32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: false,
            sound: false,
            light: false,
            heater: false,
            heater_present: false,
            mode: Mode::Unknown,
            fan_speed: 0,
            target_temp: 0,
            in_temp: 0,
            out_temp: 0,
            filter_remaining_pct: 0.0,
            device_work_time_days: 0.0,
            error_code: 0,
            firmware_version: String::new(),
            has_valid_state: false,
            filter_change_required: false,
            co2_auto: false,
            electronics_temp: 0,
            electronics_work_time_days: 0.0,
            filter_used_days: 0.0,
            presets: Presets::FACTORY,
            max_fan_speed: MAX_FAN_SPEED,
            heater_percent: 0,
            timer: false,
            device_time: None,
            productivity: 0,
            filter_remaining_days: 0.0,
        }
    }
}

impl DeviceState {
    /// Create an empty state. `has_valid_state` is false until a read succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan power as `"on"`/`"off"`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        decode_flag(self.power)
    }

    /// Sound as `"on"`/`"off"`.
    #[must_use]
    pub fn sound_flag(&self) -> &'static str {
        decode_flag(self.sound)
    }

    /// Light as `"on"`/`"off"`.
    #[must_use]
    pub fn light_flag(&self) -> &'static str {
        decode_flag(self.light)
    }

    /// Heater as `"on"`/`"off"`.
    #[must_use]
    pub fn heater_flag(&self) -> &'static str {
        decode_flag(self.heater)
    }

    /// Set the fan speed, rejecting values above [`MAX_FAN_SPEED`].
    pub fn set_fan_speed(&mut self, speed: u8) -> Result<(), FieldError> {
        if speed > MAX_FAN_SPEED {
            return Err(FieldError::invalid(
                "fan_speed",
                format!("must be 0..={}, got {}", MAX_FAN_SPEED, speed),
            ));
        }
        self.fan_speed = speed;
        Ok(())
    }

    /// Apply a partial update keyed by field name.
    ///
    /// Flags accept JSON booleans or `"on"`/`"off"`. A `fan_speed` of 0 turns
    /// the breezer off and leaves the stored speed untouched. The update is
    /// atomic: if any key is rejected the state is left unchanged.
    ///
    /// ```
    /// use serde_json::json;
    /// use tion_types::DeviceState;
    ///
    /// let mut state = DeviceState::new();
    /// state.power = true;
    /// state.fan_speed = 4;
    ///
    /// let update = json!({"fan_speed": 0});
    /// state.apply_partial(update.as_object().unwrap()).unwrap();
    /// assert!(!state.power);
    /// assert_eq!(state.fan_speed, 4);
    /// ```
    pub fn apply_partial(&mut self, update: &Map<String, Value>) -> Result<(), FieldError> {
        let mut staged = self.clone();
        for (key, value) in update.iter().filter(|(key, _)| key.as_str() != "fan_speed") {
            staged.apply_field(key, value)?;
        }
        // applied last so that a zero speed wins over "state": "on"
        if let Some(speed) = update.get("fan_speed") {
            staged.apply_field("fan_speed", speed)?;
        }
        *self = staged;
        Ok(())
    }

    fn apply_field(&mut self, key: &str, value: &Value) -> Result<(), FieldError> {
        match key {
            "power" | "state" => self.power = parse_flag(key, value)?,
            "sound" => self.sound = parse_flag(key, value)?,
            "light" => self.light = parse_flag(key, value)?,
            "heater" => self.heater = parse_flag(key, value)?,
            "mode" => {
                let name = value
                    .as_str()
                    .ok_or_else(|| FieldError::invalid(key, "expected a string"))?;
                self.mode = name.parse()?;
            }
            "fan_speed" => {
                let speed = parse_integer(key, value)?;
                if speed == 0 {
                    self.power = false;
                } else {
                    let speed = u8::try_from(speed)
                        .map_err(|_| FieldError::invalid(key, format!("out of range: {}", speed)))?;
                    self.set_fan_speed(speed)?;
                }
            }
            "target_temp" => {
                let temp = parse_integer(key, value)?;
                self.target_temp = i16::try_from(temp)
                    .ok()
                    .filter(|t| (-128..=127).contains(t))
                    .ok_or_else(|| FieldError::invalid(key, format!("out of range: {}", temp)))?;
            }
            other if READ_ONLY_FIELDS.contains(&other) => {
                return Err(FieldError::ReadOnly(other.to_string()));
            }
            other => return Err(FieldError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    /// Render the state as a JSON object keyed by field name.
    ///
    /// Flags are rendered as `"on"`/`"off"`, matching what update mappings accept.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("state".into(), self.state().into());
        map.insert("sound".into(), self.sound_flag().into());
        map.insert("light".into(), self.light_flag().into());
        map.insert("heater".into(), self.heater_flag().into());
        map.insert("heater_present".into(), self.heater_present.into());
        map.insert("mode".into(), self.mode.as_str().into());
        map.insert("fan_speed".into(), self.fan_speed.into());
        map.insert("target_temp".into(), self.target_temp.into());
        map.insert("in_temp".into(), self.in_temp.into());
        map.insert("out_temp".into(), self.out_temp.into());
        map.insert(
            "filter_remaining_pct".into(),
            f64::from(self.filter_remaining_pct).into(),
        );
        map.insert(
            "device_work_time_days".into(),
            f64::from(self.device_work_time_days).into(),
        );
        map.insert("error_code".into(), self.error_code.into());
        map.insert("firmware_version".into(), self.firmware_version.clone().into());
        if let Some(time) = self.device_time {
            map.insert(
                "time".into(),
                format!("{}:{}", time.hour(), time.minute()).into(),
            );
        }
        Value::Object(map)
    }
}

fn parse_flag(field: &str, value: &Value) -> Result<bool, FieldError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => encode_flag(s)
            .ok_or_else(|| FieldError::invalid(field, format!("expected \"on\" or \"off\", got '{}'", s))),
        other => Err(FieldError::invalid(
            field,
            format!("expected a flag, got {}", other),
        )),
    }
}

fn parse_integer(field: &str, value: &Value) -> Result<i64, FieldError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| FieldError::invalid(field, format!("expected an integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FieldError::invalid(field, format!("expected an integer, got '{}'", s))),
        other => Err(FieldError::invalid(
            field,
            format!("expected an integer, got {}", other),
        )),
    }
}
