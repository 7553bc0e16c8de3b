//! Tion Lite protocol.
//!
//! Frames are `header[15] ++ payload ++ trailer[2]`, split into 20-byte
//! packets tagged by their role byte. Requests carry a 4-byte correlation id
//! at `header[7..11]` that the response echoes.
//!
//! Parameter payload layout (big-endian):
//!
//! | Offset | Field |
//! |--------|-------|
//! | 0 | status bits: power, sound, light, -, filter change, CO2 auto, heater, heater present |
//! | 2 | mode |
//! | 3 | target temperature |
//! | 4 | fan speed |
//! | 5, 6, 7 | inlet, outlet, electronics temperature |
//! | 8..11 | electronics work time, seconds |
//! | 16..19 | filter used, seconds |
//! | 20..24 | device work time, seconds |
//! | 28 | error code |
//! | 48..51, 51..54 | preset temperatures, preset fan speeds |
//! | 54 | max fan speed |
//! | 55 | heater percent |

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use tion_types::framing::{
    HEADER_LEN, MAGIC, PACKET_LEN, PacketRole, RawFrame, TRAILER, decode_temperature,
    encode_temperature, status_bit, validate_trailer,
};
use tion_types::uuid::{LITE_NOTIFY, LITE_WRITE};
use tion_types::{DecodeError, DecodeResult, DeviceModel, DeviceState, Mode, Presets};

use super::{BreezerProtocol, FrameReader};
use crate::commands::{
    Command, CommandKind, LITE_REQUEST_DEVICE_INFO, LITE_REQUEST_DEVICE_INFO_SUFFIX,
    LITE_REQUEST_ID, LITE_REQUEST_PARAMS, LITE_REQUEST_PARAMS_SUFFIX, LITE_RESPONSE_DEVICE_INFO,
    LITE_RESPONSE_PARAMS, LITE_SET_PARAMS, hex,
};
use crate::random::RandomSource;

/// Shortest parameter payload carrying every decoded field.
pub const PARAMS_MIN_PAYLOAD: usize = 56;

/// Shortest device information payload.
pub const DEVICE_INFO_MIN_PAYLOAD: usize = 3;

/// Length of the parameter payload the breezer sends.
const PARAMS_PAYLOAD_LEN: usize = 57;

/// Length of the device information payload the breezer sends.
const DEVICE_INFO_PAYLOAD_LEN: usize = 22;

const SECONDS_PER_DAY: f64 = 86_400.0;
const FILTER_LIFETIME_DAYS: f64 = 180.0;

/// Codec for the Lite family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteProtocol {
    /// Reject responses whose trailer is not `BB AA`.
    pub strict_trailer: bool,
    /// Reject responses that do not echo the request's correlation id.
    pub verify_correlation: bool,
}

impl Default for LiteProtocol {
    fn default() -> Self {
        Self {
            strict_trailer: false,
            verify_correlation: true,
        }
    }
}

impl LiteProtocol {
    /// Create a codec with default decode checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable trailer validation of responses.
    #[must_use]
    pub fn strict_trailer(mut self, enabled: bool) -> Self {
        self.strict_trailer = enabled;
        self
    }

    /// Enable or disable correlation id checks.
    #[must_use]
    pub fn verify_correlation(mut self, enabled: bool) -> Self {
        self.verify_correlation = enabled;
        self
    }

    fn request(opcode: [u8; 2], suffix: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + suffix.len() + TRAILER.len());
        buf.extend_from_slice(&[PacketRole::Single.id(), 0x10, 0x00, MAGIC, 0x02]);
        buf.extend_from_slice(&opcode);
        buf.extend_from_slice(&LITE_REQUEST_ID);
        buf.extend_from_slice(suffix);
        buf.extend_from_slice(&TRAILER);
        buf
    }

    /// The frame the breezer sends in answer to a device information request.
    pub fn encode_device_info_response(&self, state: &DeviceState, request: &Command) -> Bytes {
        let [hi, lo] = firmware_bytes(&state.firmware_version);
        let mut payload = [0u8; DEVICE_INFO_PAYLOAD_LEN];
        payload[1] = lo;
        payload[2] = hi;
        response_frame(LITE_RESPONSE_DEVICE_INFO, request, &payload)
    }

    fn decode_params(payload: &[u8], base: &DeviceState) -> DecodeResult<DeviceState> {
        if payload.len() < PARAMS_MIN_PAYLOAD {
            return Err(DecodeError::Truncated {
                expected: PARAMS_MIN_PAYLOAD,
                actual: payload.len(),
            });
        }

        let mut state = base.clone();
        let status = payload[0];
        state.power = status_bit(status, 0);
        state.sound = status_bit(status, 1);
        state.light = status_bit(status, 2);
        state.filter_change_required = status_bit(status, 4);
        state.co2_auto = status_bit(status, 5);
        state.heater = status_bit(status, 6);
        state.heater_present = status_bit(status, 7);

        state.mode = Mode::from_code(payload[2]);
        state.target_temp = decode_temperature(payload[3]);
        state.fan_speed = payload[4];
        state.in_temp = decode_temperature(payload[5]);
        state.out_temp = decode_temperature(payload[6]);
        state.electronics_temp = decode_temperature(payload[7]);

        state.electronics_work_time_days = seconds_to_days(be_uint(&payload[8..11]));
        state.filter_used_days = seconds_to_days(be_uint(&payload[16..19]));
        state.filter_remaining_pct =
            (f64::from(be_uint(&payload[16..19])) / SECONDS_PER_DAY * 100.0 / FILTER_LIFETIME_DAYS)
                as f32;
        state.device_work_time_days = seconds_to_days(be_uint(&payload[20..24]));

        state.error_code = payload[28];
        // shares its bytes with the filter counter; device info is authoritative
        state.firmware_version = format!("{:02x}{:02x}", payload[17], payload[16]);
        state.presets = Presets {
            temperatures: [payload[48], payload[49], payload[50]],
            fan_speeds: [payload[51], payload[52], payload[53]],
        };
        state.max_fan_speed = payload[54];
        state.heater_percent = payload[55];
        state.has_valid_state = true;
        Ok(state)
    }

    fn decode_device_info(payload: &[u8], base: &DeviceState) -> DecodeResult<DeviceState> {
        if payload.len() < DEVICE_INFO_MIN_PAYLOAD {
            return Err(DecodeError::Truncated {
                expected: DEVICE_INFO_MIN_PAYLOAD,
                actual: payload.len(),
            });
        }
        let mut state = base.clone();
        state.firmware_version = format!("{:02x}{:02x}", payload[2], payload[1]);
        Ok(state)
    }
}

impl BreezerProtocol for LiteProtocol {
    fn model(&self) -> DeviceModel {
        DeviceModel::Lite
    }

    fn write_characteristic(&self) -> Uuid {
        LITE_WRITE
    }

    fn notify_characteristic(&self) -> Uuid {
        LITE_NOTIFY
    }

    fn encode_get(&self) -> Command {
        Command::new(
            CommandKind::RequestParams,
            Self::request(LITE_REQUEST_PARAMS, &LITE_REQUEST_PARAMS_SUFFIX),
        )
        .with_correlation(LITE_REQUEST_ID)
    }

    fn encode_device_info(&self) -> Option<Command> {
        Some(
            Command::new(
                CommandKind::RequestDeviceInfo,
                Self::request(LITE_REQUEST_DEVICE_INFO, &LITE_REQUEST_DEVICE_INFO_SUFFIX),
            )
            .with_correlation(LITE_REQUEST_ID),
        )
    }

    fn encode_set(&self, state: &DeviceState, rng: &mut dyn RandomSource) -> Command {
        let mut filler = [0u8; 9];
        rng.fill(&mut filler);

        let mut status = u8::from(state.power)
            | (u8::from(state.sound) << 1)
            | (u8::from(state.light) << 2);
        if state.heater_present && state.heater {
            status |= 1 << 4;
        }
        let fan_flag = if state.fan_speed > 0 { 0x02 } else { 0x01 };

        let mut buf = Vec::with_capacity(31);
        buf.extend_from_slice(&[PacketRole::First.id(), 0x1E, 0x00, MAGIC, filler[0]]);
        buf.extend_from_slice(&LITE_SET_PARAMS);
        buf.extend_from_slice(&filler[1..]);
        buf.extend_from_slice(&[
            status,
            0x00,
            fan_flag,
            encode_temperature(state.target_temp),
            state.fan_speed,
        ]);
        buf.extend_from_slice(&state.presets.to_bytes());
        buf.extend_from_slice(&[0x64, 0x00, 0x00]);
        buf.extend_from_slice(&TRAILER);

        Command::new(CommandKind::SetParams, buf)
    }

    fn packetize(&self, frame: &[u8]) -> Vec<Bytes> {
        if frame.is_empty() {
            return Vec::new();
        }
        if frame.len() <= PACKET_LEN {
            let mut packet = frame.to_vec();
            packet[0] = PacketRole::Single.id();
            return vec![Bytes::from(packet)];
        }

        let mut first = frame[..PACKET_LEN].to_vec();
        first[0] = PacketRole::First.id();
        let mut packets = vec![Bytes::from(first)];

        let chunks: Vec<&[u8]> = frame[PACKET_LEN..].chunks(PACKET_LEN - 1).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let role = if i == last {
                PacketRole::End
            } else {
                PacketRole::Middle
            };
            let mut packet = Vec::with_capacity(chunk.len() + 1);
            packet.push(role.id());
            packet.extend_from_slice(chunk);
            packets.push(Bytes::from(packet));
        }
        packets
    }

    fn new_frame_reader(&self) -> FrameReader {
        FrameReader::reassembling()
    }

    fn decode_frame(
        &self,
        frame: &[u8],
        request: &Command,
        base: &DeviceState,
    ) -> DecodeResult<DeviceState> {
        let raw = RawFrame::from_buffer(frame)?;
        debug!(
            "Lite frame: header={} payload={} trailer={}",
            hex(&raw.header),
            hex(&raw.payload),
            hex(&raw.trailer)
        );

        if self.strict_trailer {
            validate_trailer(frame)?;
        }
        if self.verify_correlation
            && let Some(sent) = request.correlation
            && raw.correlation_id() != sent
        {
            return Err(DecodeError::CorrelationMismatch {
                sent,
                received: raw.correlation_id(),
            });
        }

        match raw.opcode() {
            LITE_RESPONSE_PARAMS => Self::decode_params(&raw.payload, base),
            LITE_RESPONSE_DEVICE_INFO => Self::decode_device_info(&raw.payload, base),
            other => Err(DecodeError::UnexpectedOpcode(other)),
        }
    }

    fn encode_telemetry(&self, state: &DeviceState, request: &Command) -> Bytes {
        if request.kind == CommandKind::RequestDeviceInfo {
            return self.encode_device_info_response(state, request);
        }

        let mut p = [0u8; PARAMS_PAYLOAD_LEN];
        p[0] = u8::from(state.power)
            | (u8::from(state.sound) << 1)
            | (u8::from(state.light) << 2)
            | (u8::from(state.filter_change_required) << 4)
            | (u8::from(state.co2_auto) << 5)
            | (u8::from(state.heater) << 6)
            | (u8::from(state.heater_present) << 7);
        p[2] = state.mode.code();
        p[3] = encode_temperature(state.target_temp);
        p[4] = state.fan_speed;
        p[5] = encode_temperature(state.in_temp);
        p[6] = encode_temperature(state.out_temp);
        p[7] = encode_temperature(state.electronics_temp);
        put_be_uint(&mut p[8..11], days_to_seconds(state.electronics_work_time_days));
        put_be_uint(&mut p[16..19], days_to_seconds(state.filter_used_days));
        put_be_uint(&mut p[20..24], days_to_seconds(state.device_work_time_days));
        p[28] = state.error_code;
        p[48..54].copy_from_slice(&state.presets.to_bytes());
        p[54] = state.max_fan_speed;
        p[55] = state.heater_percent;
        response_frame(LITE_RESPONSE_PARAMS, request, &p)
    }

    fn parse_command(&self, frame: &[u8]) -> DecodeResult<Command> {
        // Requests can be shorter than a full header plus trailer.
        if frame.len() < 11 {
            return Err(DecodeError::Truncated {
                expected: 11,
                actual: frame.len(),
            });
        }
        if frame[3] != MAGIC {
            return Err(DecodeError::InvalidMagic {
                expected: MAGIC,
                found: frame[3],
            });
        }
        let opcode = [frame[5], frame[6]];
        let correlation = [frame[7], frame[8], frame[9], frame[10]];
        let kind = match opcode {
            LITE_REQUEST_PARAMS => CommandKind::RequestParams,
            LITE_REQUEST_DEVICE_INFO => CommandKind::RequestDeviceInfo,
            LITE_SET_PARAMS => CommandKind::SetParams,
            other => return Err(DecodeError::UnexpectedOpcode(other)),
        };
        let command = Command::new(kind, Bytes::copy_from_slice(frame));
        Ok(if kind.expects_response() {
            command.with_correlation(correlation)
        } else {
            command
        })
    }

    fn parse_set_command(&self, frame: &[u8], base: &DeviceState) -> DecodeResult<DeviceState> {
        let raw = RawFrame::from_buffer(frame)?;
        if raw.opcode() != LITE_SET_PARAMS {
            return Err(DecodeError::UnexpectedOpcode(raw.opcode()));
        }
        let p = &raw.payload;
        if p.len() < 11 {
            return Err(DecodeError::Truncated {
                expected: 11,
                actual: p.len(),
            });
        }

        let mut state = base.clone();
        state.power = status_bit(p[0], 0);
        state.sound = status_bit(p[0], 1);
        state.light = status_bit(p[0], 2);
        if state.heater_present {
            state.heater = status_bit(p[0], 4);
        }
        state.target_temp = decode_temperature(p[3]);
        state.fan_speed = p[4];
        state.presets = Presets {
            temperatures: [p[5], p[6], p[7]],
            fan_speeds: [p[8], p[9], p[10]],
        };
        Ok(state)
    }
}

fn response_frame(opcode: [u8; 2], request: &Command, payload: &[u8]) -> Bytes {
    let total = HEADER_LEN + payload.len() + TRAILER.len();
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&[
        PacketRole::First.id(),
        (total - 1) as u8,
        0x00,
        MAGIC,
        0x00,
    ]);
    buf.extend_from_slice(&opcode);
    buf.extend_from_slice(&request.correlation.unwrap_or(LITE_REQUEST_ID));
    buf.extend_from_slice(&[0x00; 4]);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&TRAILER);
    Bytes::from(buf)
}

/// Firmware version string as `[hi, lo]`; anything but four hex digits is zero.
pub(crate) fn firmware_bytes(version: &str) -> [u8; 2] {
    if version.len() != 4 {
        return [0, 0];
    }
    u16::from_str_radix(version, 16)
        .map(u16::to_be_bytes)
        .unwrap_or([0, 0])
}

fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn put_be_uint(out: &mut [u8], value: u32) {
    let max = if out.len() >= 4 {
        u32::MAX
    } else {
        (1u32 << (8 * out.len())) - 1
    };
    let be = value.min(max).to_be_bytes();
    let start = be.len() - out.len();
    out.copy_from_slice(&be[start..]);
}

fn seconds_to_days(seconds: u32) -> f32 {
    (f64::from(seconds) / SECONDS_PER_DAY) as f32
}

fn days_to_seconds(days: f32) -> u32 {
    (f64::from(days) * SECONDS_PER_DAY).round().clamp(0.0, f64::from(u32::MAX)) as u32
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::reassembly::Reassembler;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let lite = LiteProtocol::default();
            let _ = lite.decode_frame(&data, &lite.encode_get(), &DeviceState::new());
        }

        /// Packetizing then reassembling reproduces the frame, role byte aside.
        #[test]
        fn packetize_then_reassemble(body in proptest::collection::vec(any::<u8>(), 13..120)) {
            let mut frame = vec![0x00, 0x10, 0x00, MAGIC];
            frame.extend_from_slice(&body);

            let lite = LiteProtocol::default();
            let mut r = Reassembler::new();
            for packet in lite.packetize(&frame) {
                r.feed(&packet).unwrap();
            }
            let mut out = r.take_frame().unwrap().to_vec();
            out[0] = frame[0];
            prop_assert_eq!(out, frame);
        }
    }
}
