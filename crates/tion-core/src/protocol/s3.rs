//! Tion S3 protocol.
//!
//! Commands and responses are single 20-byte packets. Commands are
//! `[0x3D, opcode, special, 0 × 16, 0x5A]`; `special` is only set for pairing.
//!
//! Response layout:
//!
//! | Offset | Field |
//! |--------|-------|
//! | 2 | mode (high nibble), fan speed (low nibble) |
//! | 3 | target temperature |
//! | 4 | status bits: heater, power, timer, sound |
//! | 7, 8 | outlet, inlet temperature |
//! | 9..11 | filter remaining days, little-endian |
//! | 11, 12 | device clock hours, minutes |
//! | 13 | error code |
//! | 14 | productivity |
//! | 17, 18 | firmware version, low then high byte |

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use tion_types::framing::{decode_temperature, encode_temperature, status_bit};
use tion_types::uuid::{S3_NOTIFY, S3_WRITE};
use tion_types::{DecodeError, DecodeResult, DeviceModel, DeviceState, Mode};

use super::lite::firmware_bytes;
use super::{BreezerProtocol, FrameReader};
use crate::commands::{
    Command, CommandKind, S3_COMMAND_LEN, S3_PAIR, S3_PREFIX, S3_REQUEST_PARAMS, S3_SET_PARAMS,
    S3_SUFFIX, hex,
};
use crate::random::RandomSource;

/// Shortest response carrying every decoded field.
pub const RESPONSE_MIN_LEN: usize = 19;

/// Codec for the S3 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct S3Protocol;

impl S3Protocol {
    /// Build a bare command for `opcode`.
    pub fn command(opcode: u8) -> [u8; S3_COMMAND_LEN] {
        let mut buf = [0u8; S3_COMMAND_LEN];
        buf[0] = S3_PREFIX;
        buf[1] = opcode;
        buf[2] = u8::from(opcode == S3_PAIR);
        buf[S3_COMMAND_LEN - 1] = S3_SUFFIX;
        buf
    }
}

fn decode_mode(code: u8) -> Mode {
    match code {
        0 => Mode::Recirculation,
        1 => Mode::Mixed,
        _ => Mode::Outside,
    }
}

impl BreezerProtocol for S3Protocol {
    fn model(&self) -> DeviceModel {
        DeviceModel::S3
    }

    fn write_characteristic(&self) -> Uuid {
        S3_WRITE
    }

    fn notify_characteristic(&self) -> Uuid {
        S3_NOTIFY
    }

    fn encode_get(&self) -> Command {
        Command::new(
            CommandKind::RequestParams,
            Bytes::copy_from_slice(&Self::command(S3_REQUEST_PARAMS)),
        )
    }

    fn encode_set(&self, state: &DeviceState, _rng: &mut dyn RandomSource) -> Command {
        let mut buf = Self::command(S3_SET_PARAMS);
        buf[2] = state.fan_speed;
        buf[3] = encode_temperature(state.target_temp);
        buf[4] = state.mode.code();
        buf[5] = u8::from(state.heater) | (u8::from(state.power) << 1) | (u8::from(state.sound) << 3);
        Command::new(CommandKind::SetParams, Bytes::copy_from_slice(&buf))
    }

    fn encode_pair(&self) -> Option<Command> {
        Some(Command::new(
            CommandKind::Pair,
            Bytes::copy_from_slice(&Self::command(S3_PAIR)),
        ))
    }

    fn packetize(&self, frame: &[u8]) -> Vec<Bytes> {
        if frame.is_empty() {
            Vec::new()
        } else {
            vec![Bytes::copy_from_slice(frame)]
        }
    }

    fn new_frame_reader(&self) -> FrameReader {
        FrameReader::single()
    }

    fn decode_frame(
        &self,
        frame: &[u8],
        _request: &Command,
        base: &DeviceState,
    ) -> DecodeResult<DeviceState> {
        if frame.len() < RESPONSE_MIN_LEN {
            return Err(DecodeError::Truncated {
                expected: RESPONSE_MIN_LEN,
                actual: frame.len(),
            });
        }
        debug!("S3 response: {}", hex(frame));

        let mut state = base.clone();
        state.fan_speed = frame[2] & 0x0F;
        state.mode = decode_mode(frame[2] >> 4);
        state.target_temp = decode_temperature(frame[3]);

        let status = frame[4];
        state.heater = status_bit(status, 0);
        state.power = status_bit(status, 1);
        state.timer = status_bit(status, 2);
        state.sound = status_bit(status, 3);

        state.out_temp = decode_temperature(frame[7]);
        state.in_temp = decode_temperature(frame[8]);
        state.filter_remaining_days = f32::from(u16::from_le_bytes([frame[9], frame[10]]));
        state.device_time = time::Time::from_hms(frame[11], frame[12], 0).ok();
        state.error_code = frame[13];
        state.productivity = frame[14];
        state.firmware_version = format!("{:02x}{:02x}", frame[18], frame[17]);
        state.has_valid_state = true;
        Ok(state)
    }

    fn encode_telemetry(&self, state: &DeviceState, _request: &Command) -> Bytes {
        let mut buf = Self::command(S3_REQUEST_PARAMS);
        buf[2] = (state.mode.code() << 4) | (state.fan_speed & 0x0F);
        buf[3] = encode_temperature(state.target_temp);
        buf[4] = u8::from(state.heater)
            | (u8::from(state.power) << 1)
            | (u8::from(state.timer) << 2)
            | (u8::from(state.sound) << 3);
        buf[7] = encode_temperature(state.out_temp);
        buf[8] = encode_temperature(state.in_temp);
        let days = state.filter_remaining_days.round().clamp(0.0, f32::from(u16::MAX)) as u16;
        buf[9..11].copy_from_slice(&days.to_le_bytes());
        if let Some(time) = state.device_time {
            buf[11] = time.hour();
            buf[12] = time.minute();
        }
        buf[13] = state.error_code;
        buf[14] = state.productivity;
        let [hi, lo] = firmware_bytes(&state.firmware_version);
        buf[17] = lo;
        buf[18] = hi;
        Bytes::copy_from_slice(&buf)
    }

    fn parse_command(&self, frame: &[u8]) -> DecodeResult<Command> {
        if frame.len() < 2 {
            return Err(DecodeError::Truncated {
                expected: 2,
                actual: frame.len(),
            });
        }
        let kind = match frame[1] {
            S3_REQUEST_PARAMS => CommandKind::RequestParams,
            S3_SET_PARAMS => CommandKind::SetParams,
            S3_PAIR => CommandKind::Pair,
            _ => return Err(DecodeError::UnexpectedOpcode([frame[0], frame[1]])),
        };
        Ok(Command::new(kind, Bytes::copy_from_slice(frame)))
    }

    fn parse_set_command(&self, frame: &[u8], base: &DeviceState) -> DecodeResult<DeviceState> {
        if frame.len() < 6 {
            return Err(DecodeError::Truncated {
                expected: 6,
                actual: frame.len(),
            });
        }
        if frame[1] != S3_SET_PARAMS {
            return Err(DecodeError::UnexpectedOpcode([frame[0], frame[1]]));
        }

        let mut state = base.clone();
        state.fan_speed = frame[2];
        state.target_temp = decode_temperature(frame[3]);
        state.mode = decode_mode(frame[4]);
        state.heater = status_bit(frame[5], 0);
        state.power = status_bit(frame[5], 1);
        state.sound = status_bit(frame[5], 3);
        Ok(state)
    }
}
