//! Protocol variants spoken by Tion breezers.
//!
//! Every supported family implements [`BreezerProtocol`]. The session is
//! generic over it, and [`ProtocolVariant`] picks the family at runtime.
//!
//! | Model | Framing | Codec |
//! |-------|---------|-------|
//! | Lite | multi-packet, reassembled | [`LiteProtocol`] |
//! | S3 | one 20-byte packet | [`S3Protocol`] |

pub mod lite;
pub mod s3;

use bytes::Bytes;
use uuid::Uuid;

use tion_types::framing::PACKET_LEN;
use tion_types::{DecodeResult, DeviceModel, DeviceState};

use crate::commands::Command;
use crate::random::RandomSource;
use crate::reassembly::Reassembler;

pub use lite::LiteProtocol;
pub use s3::S3Protocol;

/// Capability set shared by all breezer families.
///
/// The encode side builds commands for the session; the decode side turns
/// complete frames into a new [`DeviceState`] without touching the caller's
/// copy. The emulator side ([`encode_telemetry`](Self::encode_telemetry),
/// [`parse_command`](Self::parse_command),
/// [`parse_set_command`](Self::parse_set_command)) is what a breezer would do
/// with the same bytes and backs the mock transports.
pub trait BreezerProtocol: Send + Sync {
    /// Breezer family.
    fn model(&self) -> DeviceModel;

    /// GATT service exposing the control characteristics.
    fn service_uuid(&self) -> Uuid {
        self.model().service_uuid()
    }

    /// Characteristic commands are written to.
    fn write_characteristic(&self) -> Uuid;

    /// Characteristic responses are notified on.
    fn notify_characteristic(&self) -> Uuid;

    /// Largest packet written in one transport call.
    fn chunk_size(&self) -> usize {
        PACKET_LEN
    }

    /// Request current parameters.
    fn encode_get(&self) -> Command;

    /// Request device information, if the family supports it.
    fn encode_device_info(&self) -> Option<Command> {
        None
    }

    /// Write the full state.
    fn encode_set(&self, state: &DeviceState, rng: &mut dyn RandomSource) -> Command;

    /// Pair command, if pairing goes through the protocol rather than the BLE stack.
    fn encode_pair(&self) -> Option<Command> {
        None
    }

    /// Split an encoded frame into the packets written one by one.
    fn packetize(&self, frame: &[u8]) -> Vec<Bytes>;

    /// A fresh collector for inbound packets.
    fn new_frame_reader(&self) -> FrameReader;

    /// Decode a complete response frame on top of `base`.
    ///
    /// `request` is the command the frame answers. The returned state is a
    /// modified copy of `base`; on error nothing is produced.
    fn decode_frame(
        &self,
        frame: &[u8],
        request: &Command,
        base: &DeviceState,
    ) -> DecodeResult<DeviceState>;

    /// Encode `state` the way the breezer reports it in answer to `request`.
    fn encode_telemetry(&self, state: &DeviceState, request: &Command) -> Bytes;

    /// Recognise a complete command frame.
    fn parse_command(&self, frame: &[u8]) -> DecodeResult<Command>;

    /// Apply a `SetParams` frame on top of `base`, as the breezer would.
    fn parse_set_command(&self, frame: &[u8], base: &DeviceState) -> DecodeResult<DeviceState>;
}

/// Runtime-selected protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// Tion Lite.
    Lite(LiteProtocol),
    /// Tion S3.
    S3(S3Protocol),
}

impl ProtocolVariant {
    /// Default codec for `model`.
    pub fn for_model(model: DeviceModel) -> Self {
        match model {
            DeviceModel::Lite => ProtocolVariant::Lite(LiteProtocol::default()),
            DeviceModel::S3 => ProtocolVariant::S3(S3Protocol),
        }
    }

    fn inner(&self) -> &dyn BreezerProtocol {
        match self {
            ProtocolVariant::Lite(p) => p,
            ProtocolVariant::S3(p) => p,
        }
    }
}

impl From<LiteProtocol> for ProtocolVariant {
    fn from(p: LiteProtocol) -> Self {
        ProtocolVariant::Lite(p)
    }
}

impl From<S3Protocol> for ProtocolVariant {
    fn from(p: S3Protocol) -> Self {
        ProtocolVariant::S3(p)
    }
}

impl BreezerProtocol for ProtocolVariant {
    fn model(&self) -> DeviceModel {
        self.inner().model()
    }

    fn write_characteristic(&self) -> Uuid {
        self.inner().write_characteristic()
    }

    fn notify_characteristic(&self) -> Uuid {
        self.inner().notify_characteristic()
    }

    fn chunk_size(&self) -> usize {
        self.inner().chunk_size()
    }

    fn encode_get(&self) -> Command {
        self.inner().encode_get()
    }

    fn encode_device_info(&self) -> Option<Command> {
        self.inner().encode_device_info()
    }

    fn encode_set(&self, state: &DeviceState, rng: &mut dyn RandomSource) -> Command {
        self.inner().encode_set(state, rng)
    }

    fn encode_pair(&self) -> Option<Command> {
        self.inner().encode_pair()
    }

    fn packetize(&self, frame: &[u8]) -> Vec<Bytes> {
        self.inner().packetize(frame)
    }

    fn new_frame_reader(&self) -> FrameReader {
        self.inner().new_frame_reader()
    }

    fn decode_frame(
        &self,
        frame: &[u8],
        request: &Command,
        base: &DeviceState,
    ) -> DecodeResult<DeviceState> {
        self.inner().decode_frame(frame, request, base)
    }

    fn encode_telemetry(&self, state: &DeviceState, request: &Command) -> Bytes {
        self.inner().encode_telemetry(state, request)
    }

    fn parse_command(&self, frame: &[u8]) -> DecodeResult<Command> {
        self.inner().parse_command(frame)
    }

    fn parse_set_command(&self, frame: &[u8], base: &DeviceState) -> DecodeResult<DeviceState> {
        self.inner().parse_set_command(frame, base)
    }
}

/// Collects inbound packets into complete frames.
#[derive(Debug)]
pub enum FrameReader {
    /// Multi-packet framing (Lite).
    Reassembling(Reassembler),
    /// Every packet is a whole frame (S3).
    Single(Option<Bytes>),
}

impl FrameReader {
    /// Reader for multi-packet frames.
    pub fn reassembling() -> Self {
        FrameReader::Reassembling(Reassembler::new())
    }

    /// Reader for single-packet frames.
    pub fn single() -> Self {
        FrameReader::Single(None)
    }

    /// Feed one packet.
    pub fn feed(&mut self, packet: &[u8]) -> DecodeResult<()> {
        match self {
            FrameReader::Reassembling(r) => r.feed(packet),
            FrameReader::Single(slot) => {
                if !packet.is_empty() {
                    *slot = Some(Bytes::copy_from_slice(packet));
                }
                Ok(())
            }
        }
    }

    /// Whether a complete frame is ready.
    pub fn is_complete(&self) -> bool {
        match self {
            FrameReader::Reassembling(r) => r.is_complete(),
            FrameReader::Single(slot) => slot.is_some(),
        }
    }

    /// Take the complete frame as one contiguous buffer.
    pub fn take_frame(&mut self) -> Option<Bytes> {
        match self {
            FrameReader::Reassembling(r) => r.take_frame().map(|f| Bytes::from(f.to_vec())),
            FrameReader::Single(slot) => slot.take(),
        }
    }

    /// Drop anything collected so far.
    pub fn reset(&mut self) {
        match self {
            FrameReader::Reassembling(r) => r.reset(),
            FrameReader::Single(slot) => *slot = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandKind;

    #[test]
    fn test_variant_for_model() {
        let lite = ProtocolVariant::for_model(DeviceModel::Lite);
        assert_eq!(lite.model(), DeviceModel::Lite);
        assert_eq!(lite.service_uuid(), tion_types::uuids::LITE_SERVICE);
        assert_eq!(lite.write_characteristic(), tion_types::uuids::LITE_WRITE);

        let s3 = ProtocolVariant::for_model(DeviceModel::S3);
        assert_eq!(s3.model(), DeviceModel::S3);
        assert_eq!(s3.notify_characteristic(), tion_types::uuids::S3_NOTIFY);
        assert_eq!(s3.chunk_size(), 20);
    }

    #[test]
    fn test_variant_delegates_encoding() {
        let lite = ProtocolVariant::for_model(DeviceModel::Lite);
        assert_eq!(lite.encode_get(), LiteProtocol::default().encode_get());
        assert!(lite.encode_pair().is_none());
        assert!(lite.encode_device_info().is_some());

        let s3 = ProtocolVariant::for_model(DeviceModel::S3);
        assert_eq!(s3.encode_pair().map(|c| c.kind), Some(CommandKind::Pair));
        assert!(s3.encode_device_info().is_none());
    }

    #[test]
    fn test_single_reader_keeps_last_packet() {
        let mut reader = FrameReader::single();
        assert!(!reader.is_complete());
        reader.feed(&[]).unwrap();
        assert!(!reader.is_complete());
        reader.feed(&[1, 2, 3]).unwrap();
        assert!(reader.is_complete());
        assert_eq!(reader.take_frame().unwrap().as_ref(), &[1, 2, 3]);
        assert!(!reader.is_complete());
    }

    #[test]
    fn test_reassembling_reader_outputs_contiguous_frame() {
        let mut reader = FrameReader::reassembling();
        for packet in crate::mock::LITE_DUMMY_PACKETS {
            reader.feed(packet).unwrap();
        }
        let frame = reader.take_frame().unwrap();
        assert_eq!(frame.len(), 74);
        assert_eq!(&frame[72..], &[0xB5, 0xAD]);
    }
}
