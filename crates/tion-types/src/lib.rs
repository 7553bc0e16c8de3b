//! Platform-agnostic types for Tion breezers.
//!
//! This crate provides the state model and framing primitives shared by the
//! protocol codecs in `tion-core`, without depending on a BLE stack.
//!
//! # Features
//!
//! - [`DeviceState`]: last known state and pending write intent of a breezer
//! - Packet framing primitives ([`framing`]): packet roles, frame splitting,
//!   temperature and bit decoding
//! - UUID constants for the Lite and S3 GATT services
//! - Error types for frame decoding and state updates
//!
//! # Example
//!
//! ```
//! use tion_types::{DeviceState, Mode};
//!
//! let mut state = DeviceState::new();
//! let update = serde_json::json!({"state": "on", "fan_speed": 3, "mode": "mixed"});
//! state.apply_partial(update.as_object().unwrap()).unwrap();
//! assert!(state.power);
//! assert_eq!(state.mode, Mode::Mixed);
//! ```

pub mod error;
pub mod framing;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult, FieldError};
pub use framing::{PacketRole, RawFrame};
pub use types::{
    DeviceModel, DeviceState, MAX_FAN_SPEED, Mode, Presets, decode_flag, encode_flag,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn update(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // --- Flag helpers ---

    #[test]
    fn test_flag_roundtrip() {
        for bit in [true, false] {
            assert_eq!(encode_flag(decode_flag(bit)), Some(bit));
        }
        assert_eq!(encode_flag("unknown"), None);
        assert_eq!(encode_flag("ON"), None);
    }

    // --- apply_partial ---

    #[test]
    fn test_apply_partial_sets_writable_fields() {
        let mut state = DeviceState::new();
        state
            .apply_partial(&update(json!({
                "power": true,
                "sound": "on",
                "light": false,
                "heater": "on",
                "mode": "recirculation",
                "fan_speed": 5,
                "target_temp": 18,
            })))
            .unwrap();

        assert!(state.power);
        assert!(state.sound);
        assert!(!state.light);
        assert!(state.heater);
        assert_eq!(state.mode, Mode::Recirculation);
        assert_eq!(state.fan_speed, 5);
        assert_eq!(state.target_temp, 18);
        assert!(!state.has_valid_state);
    }

    #[test]
    fn test_apply_partial_state_alias() {
        let mut state = DeviceState::new();
        state.apply_partial(&update(json!({"state": "on"}))).unwrap();
        assert!(state.power);
        assert_eq!(state.state(), "on");
    }

    #[test]
    fn test_zero_fan_speed_turns_off() {
        let mut state = DeviceState::new();
        state.power = true;
        state.fan_speed = 3;

        state.apply_partial(&update(json!({"fan_speed": 0}))).unwrap();

        assert!(!state.power);
        assert_eq!(state.fan_speed, 3);
    }

    #[test]
    fn test_zero_fan_speed_overrides_power_on() {
        let mut state = DeviceState::new();
        state.fan_speed = 4;

        for key in ["state", "power"] {
            state
                .apply_partial(&update(json!({key: "on", "fan_speed": 0})))
                .unwrap();
            assert!(!state.power, "{} on with fan_speed 0 must stay off", key);
            assert_eq!(state.fan_speed, 4);
        }
    }

    #[test]
    fn test_nonzero_fan_speed_with_power_off() {
        let mut state = DeviceState::new();
        state.power = true;

        state
            .apply_partial(&update(json!({"state": "off", "fan_speed": 2})))
            .unwrap();
        assert!(!state.power);
        assert_eq!(state.fan_speed, 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut state = DeviceState::new();
        let err = state
            .apply_partial(&update(json!({"turbo": true})))
            .unwrap_err();
        assert_eq!(err, FieldError::UnknownField("turbo".to_string()));
    }

    #[test]
    fn test_read_only_field_rejected() {
        let mut state = DeviceState::new();
        let err = state
            .apply_partial(&update(json!({"in_temp": 10})))
            .unwrap_err();
        assert_eq!(err, FieldError::ReadOnly("in_temp".to_string()));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut state = DeviceState::new();
        assert!(matches!(
            state.apply_partial(&update(json!({"fan_speed": 7}))),
            Err(FieldError::InvalidValue { .. })
        ));
        assert!(matches!(
            state.apply_partial(&update(json!({"fan_speed": -1}))),
            Err(FieldError::InvalidValue { .. })
        ));
        assert!(matches!(
            state.apply_partial(&update(json!({"sound": "maybe"}))),
            Err(FieldError::InvalidValue { .. })
        ));
        assert!(matches!(
            state.apply_partial(&update(json!({"mode": "turbo"}))),
            Err(FieldError::InvalidValue { .. })
        ));
        assert!(matches!(
            state.apply_partial(&update(json!({"target_temp": 300}))),
            Err(FieldError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_apply_partial_is_atomic() {
        let mut state = DeviceState::new();
        state.fan_speed = 2;
        let before = state.clone();

        let result = state.apply_partial(&update(json!({"fan_speed": 4, "bogus": 1})));

        assert!(result.is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_string_integer_accepted() {
        let mut state = DeviceState::new();
        state.apply_partial(&update(json!({"fan_speed": "2"}))).unwrap();
        assert_eq!(state.fan_speed, 2);
    }

    // --- Mode and model ---

    #[test]
    fn test_mode_codes() {
        assert_eq!(Mode::from_code(0), Mode::Recirculation);
        assert_eq!(Mode::from_code(1), Mode::Mixed);
        assert_eq!(Mode::from_code(2), Mode::Outside);
        assert_eq!(Mode::from_code(9), Mode::Unknown);
        assert_eq!(Mode::Unknown.code(), 2);
        for mode in [Mode::Recirculation, Mode::Mixed, Mode::Outside] {
            assert_eq!(Mode::from_code(mode.code()), mode);
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_device_model_parse() {
        assert_eq!("LITE".parse::<DeviceModel>().unwrap(), DeviceModel::Lite);
        assert_eq!("tion s3".parse::<DeviceModel>().unwrap(), DeviceModel::S3);
        assert!("s4".parse::<DeviceModel>().is_err());
        assert_eq!(DeviceModel::Lite.service_uuid(), uuids::LITE_SERVICE);
    }

    #[test]
    fn test_presets_wire_order() {
        assert_eq!(
            Presets::FACTORY.to_bytes(),
            [0x0A, 0x14, 0x19, 0x02, 0x04, 0x06]
        );
    }

    // --- Serialization ---

    #[test]
    fn test_state_json_flags() {
        let mut state = DeviceState::new();
        state.power = true;
        state.mode = Mode::Mixed;
        state.firmware_version = "054b".to_string();

        let json = state.to_json();
        assert_eq!(json["state"], "on");
        assert_eq!(json["sound"], "off");
        assert_eq!(json["mode"], "mixed");
        assert_eq!(json["firmware_version"], "054b");
        assert!(json.get("time").is_none());
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = DeviceState::new();
        state.fan_speed = 4;
        state.in_temp = -7;
        state.device_time = Some(time::Time::from_hms(13, 45, 0).unwrap());

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"mode\":\"unknown\""));
        let restored: DeviceState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Classifying arbitrary leading bytes never panics.
        #[test]
        fn classify_never_panics(byte: u8) {
            let _ = framing::classify(byte);
        }

        /// Splitting arbitrary buffers never panics.
        #[test]
        fn raw_frame_never_panics(data: Vec<u8>) {
            let _ = RawFrame::from_buffer(&data);
        }

        /// Any fan speed in range survives an update.
        #[test]
        fn fan_speed_update_applies(speed in 1u8..=MAX_FAN_SPEED) {
            let mut state = DeviceState::new();
            let update = serde_json::json!({"fan_speed": speed});
            state.apply_partial(update.as_object().unwrap()).unwrap();
            prop_assert_eq!(state.fan_speed, speed);
        }
    }
}
