//! Mock transports for testing without BLE hardware.
//!
//! Two transports are provided:
//!
//! - [`FixtureTransport`] replays a fixed packet sequence after every write.
//!   [`FixtureTransport::lite_dummy`] replays a captured Lite answer.
//! - [`MockBreezer`] emulates a breezer: it decodes what is written, keeps a
//!   [`DeviceState`], applies `SetParams` commands and answers requests with
//!   telemetry encoded from that state.
//!
//! Both keep [`MockStats`] and support failure injection: stale handles on
//! the next writes, failed connection attempts and silence.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use tion_types::framing::PacketRole;
use tion_types::{DeviceModel, DeviceState};

use crate::commands::{Command, CommandKind, hex};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::protocol::{BreezerProtocol, ProtocolVariant};
use crate::reassembly::Reassembler;
use crate::transport::Transport;

/// A parameters answer captured from a Tion Lite, split the way it arrives.
pub const LITE_DUMMY_PACKETS: &[&[u8]] = &[
    &[
        0x00, 0x49, 0x00, 0x3A, 0x4E, 0x31, 0x12, 0x0D, 0xD7, 0x1F, 0x8F, 0xBF, 0xC9, 0x40, 0x37,
        0xCF, 0xD8, 0x02, 0x0F, 0x04,
    ],
    &[
        0x40, 0x09, 0x0F, 0x1A, 0x80, 0x8E, 0x05, 0x00, 0xE9, 0x8B, 0x05, 0x00, 0x17, 0xC2, 0xE7,
        0x00, 0x26, 0x1B, 0x18, 0x00,
    ],
    &[
        0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x04,
        0x02, 0x00, 0x00, 0x00, 0x00,
    ],
    &[
        0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A, 0x14, 0x19, 0x02, 0x04, 0x06, 0x06, 0x18, 0x00,
        0xB5, 0xAD,
    ],
];

/// Counters kept by the mock transports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Connection attempts, successful or not.
    pub connect_attempts: u32,
    /// Successful connections.
    pub connects: u32,
    /// Disconnections of a live link.
    pub disconnects: u32,
    /// Notification subscriptions.
    pub subscriptions: u32,
    /// Direct characteristic reads.
    pub reads: u32,
}

/// Connection bookkeeping and failure injection shared by the mocks.
#[derive(Debug, Default)]
struct MockLink {
    address: Option<String>,
    connected: bool,
    stats: MockStats,
    written: Vec<Bytes>,
    inbox: VecDeque<Bytes>,
    stale_writes: u32,
    connect_failures: u32,
}

impl MockLink {
    fn connect(&mut self, address: &str) -> Result<()> {
        self.stats.connect_attempts += 1;
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(Error::connection_failed(
                Some(address.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }
        if !self.connected {
            debug!("Mock connected to {}", address);
            self.connected = true;
            self.address = Some(address.to_string());
            self.stats.connects += 1;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.stats.disconnects += 1;
        }
        self.inbox.clear();
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn subscribe(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.stats.subscriptions += 1;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        if self.stale_writes > 0 {
            self.stale_writes -= 1;
            self.connected = false;
            self.inbox.clear();
            return Err(Error::NotConnected);
        }
        self.written.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn read(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.stats.reads += 1;
        Ok(())
    }

    async fn wait(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        match self.inbox.pop_front() {
            Some(packet) => Ok(Some(packet.to_vec())),
            None => {
                sleep(timeout).await;
                Ok(None)
            }
        }
    }
}

/// Replays a fixed packet sequence after every write.
///
/// # Example
///
/// ```
/// use tion_core::mock::FixtureTransport;
/// use tion_core::{Breezer, DeviceModel};
///
/// #[tokio::main]
/// async fn main() {
///     let mut breezer = Breezer::for_model(FixtureTransport::lite_dummy(), "dummy", DeviceModel::Lite);
///     let state = breezer.get(false).await.unwrap();
///     assert!(state.power);
///     assert_eq!(state.fan_speed, 4);
/// }
/// ```
#[derive(Debug, Default)]
pub struct FixtureTransport {
    link: MockLink,
    packets: Vec<Bytes>,
    read_value: Vec<u8>,
}

impl FixtureTransport {
    /// Create a transport replaying `packets`.
    pub fn new<I, P>(packets: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        Self {
            packets: packets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Replay the captured Lite parameters answer.
    pub fn lite_dummy() -> Self {
        Self::new(LITE_DUMMY_PACKETS.iter().copied().map(Bytes::from_static))
    }

    /// A transport that never notifies.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Value returned by direct reads.
    #[must_use]
    pub fn with_read_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.read_value = value.into();
        self
    }

    /// Replace the sequence replayed after the next write.
    pub fn set_packets<I, P>(&mut self, packets: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        self.packets = packets.into_iter().map(Into::into).collect();
    }

    /// Fail the next `count` writes as if the handle had gone stale.
    #[must_use]
    pub fn with_stale_writes(mut self, count: u32) -> Self {
        self.link.stale_writes = count;
        self
    }

    /// Fail the next `count` connection attempts.
    #[must_use]
    pub fn with_connect_failures(mut self, count: u32) -> Self {
        self.link.connect_failures = count;
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> &MockStats {
        &self.link.stats
    }

    /// Every packet written successfully, in order.
    pub fn written(&self) -> &[Bytes] {
        &self.link.written
    }

    /// Address of the last successful connection.
    pub fn address(&self) -> Option<&str> {
        self.link.address.as_deref()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn connect(&mut self, address: &str) -> Result<()> {
        self.link.connect(address)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.link.disconnect();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.link.connected
    }

    async fn enable_notifications(&mut self, _characteristic: Uuid) -> Result<()> {
        self.link.subscribe()
    }

    async fn write(&mut self, _characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.link.write(data)?;
        self.link.inbox.extend(self.packets.iter().cloned());
        Ok(())
    }

    async fn read(&mut self, _characteristic: Uuid) -> Result<Vec<u8>> {
        self.link.read()?;
        Ok(self.read_value.clone())
    }

    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.link.wait(timeout).await
    }
}

/// An emulated breezer.
///
/// Written packets are collected into frames (Lite `Single` packets are
/// complete on their own, multi-packet writes go through a [`Reassembler`]),
/// recognised with [`BreezerProtocol::parse_command`] and acted upon:
///
/// | Command | Effect |
/// |---------|--------|
/// | `RequestParams`, `RequestDeviceInfo` | telemetry for the current state is notified |
/// | `SetParams` | the state is updated |
/// | `Pair` | [`paired`](Self::paired) becomes true |
///
/// Frames that cannot be parsed are counted in
/// [`rejected_frames`](Self::rejected_frames) and otherwise ignored.
#[derive(Debug)]
pub struct MockBreezer {
    link: MockLink,
    protocol: ProtocolVariant,
    state: DeviceState,
    reader: Reassembler,
    last_reply: Option<Bytes>,
    notify: bool,
    paired: bool,
    rejected: u32,
}

impl MockBreezer {
    /// Emulate a breezer of `model` in its default state.
    pub fn new(model: DeviceModel) -> Self {
        Self::with_protocol(ProtocolVariant::for_model(model))
    }

    /// Emulate a breezer speaking `protocol`.
    pub fn with_protocol(protocol: impl Into<ProtocolVariant>) -> Self {
        Self {
            link: MockLink::default(),
            protocol: protocol.into(),
            state: DeviceState::new(),
            reader: Reassembler::new(),
            last_reply: None,
            notify: true,
            paired: false,
            rejected: 0,
        }
    }

    /// Start from `state`.
    #[must_use]
    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    /// When disabled, answers are only available through direct reads.
    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    /// Fail the next `count` writes as if the handle had gone stale.
    #[must_use]
    pub fn with_stale_writes(mut self, count: u32) -> Self {
        self.link.stale_writes = count;
        self
    }

    /// Fail the next `count` connection attempts.
    #[must_use]
    pub fn with_connect_failures(mut self, count: u32) -> Self {
        self.link.connect_failures = count;
        self
    }

    /// The emulated device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Change the emulated device state, as a user pressing buttons would.
    pub fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    /// Whether a pair command was received.
    pub fn paired(&self) -> bool {
        self.paired
    }

    /// Number of written frames that could not be used.
    pub fn rejected_frames(&self) -> u32 {
        self.rejected
    }

    /// Counters so far.
    pub fn stats(&self) -> &MockStats {
        &self.link.stats
    }

    /// Every packet written successfully, in order.
    pub fn written(&self) -> &[Bytes] {
        &self.link.written
    }

    fn collect_frame(&mut self, packet: &[u8]) -> Option<Bytes> {
        let single = match self.protocol {
            ProtocolVariant::S3(_) => true,
            ProtocolVariant::Lite(_) => packet.first() == Some(&PacketRole::Single.id()),
        };
        if single {
            return Some(Bytes::copy_from_slice(packet));
        }

        if let Err(e) = self.reader.feed(packet) {
            warn!("Mock breezer dropped packet {}: {}", hex(packet), e);
            self.rejected += 1;
            return None;
        }
        self.reader
            .take_frame()
            .map(|frame| Bytes::from(frame.to_vec()))
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let command = match self.protocol.parse_command(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("Mock breezer rejected frame {}: {}", hex(frame), e);
                self.rejected += 1;
                return;
            }
        };
        debug!("Mock breezer got {}", command.kind);

        match command.kind {
            CommandKind::RequestParams | CommandKind::RequestDeviceInfo => self.reply(&command),
            CommandKind::SetParams => match self.protocol.parse_set_command(frame, &self.state) {
                Ok(state) => self.state = state,
                Err(e) => {
                    warn!("Mock breezer rejected set command: {}", e);
                    self.rejected += 1;
                }
            },
            CommandKind::Pair => self.paired = true,
        }
    }

    fn reply(&mut self, request: &Command) {
        let frame = self.protocol.encode_telemetry(&self.state, request);
        let packets = self.protocol.packetize(&frame);
        self.last_reply = packets.last().cloned();
        if self.notify {
            self.link.inbox.extend(packets);
        }
    }
}

#[async_trait]
impl Transport for MockBreezer {
    async fn connect(&mut self, address: &str) -> Result<()> {
        self.link.connect(address)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.link.disconnect();
        self.reader.reset();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.link.connected
    }

    async fn enable_notifications(&mut self, _characteristic: Uuid) -> Result<()> {
        self.link.subscribe()
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        if characteristic != self.protocol.write_characteristic() {
            return Err(Error::write_failed(
                characteristic.to_string(),
                "characteristic is not writable",
            ));
        }
        self.link.write(data)?;
        if let Some(frame) = self.collect_frame(data) {
            self.handle_frame(&frame);
        }
        Ok(())
    }

    async fn read(&mut self, _characteristic: Uuid) -> Result<Vec<u8>> {
        self.link.read()?;
        Ok(self
            .last_reply
            .as_ref()
            .map(|packet| packet.to_vec())
            .unwrap_or_default())
    }

    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.link.wait(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LiteProtocol, S3Protocol};
    use crate::random::FixedRandom;
    use tion_types::Mode;
    use tion_types::uuids::{LITE_NOTIFY, LITE_WRITE, S3_NOTIFY, S3_WRITE};

    const WAIT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_fixture_replays_after_each_write() {
        let mut t = FixtureTransport::lite_dummy();
        t.connect("dummy").await.unwrap();
        t.write(LITE_WRITE, &[0x80]).await.unwrap();

        for expected in LITE_DUMMY_PACKETS {
            let packet = t.wait_for_notification(WAIT).await.unwrap().unwrap();
            assert_eq!(packet.as_slice(), *expected);
        }
        assert_eq!(t.wait_for_notification(WAIT).await.unwrap(), None);
        assert_eq!(t.address(), Some("dummy"));
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mut t = FixtureTransport::lite_dummy();
        assert!(matches!(
            t.write(LITE_WRITE, &[0x80]).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            t.wait_for_notification(WAIT).await,
            Err(Error::NotConnected)
        ));
        assert!(t.written().is_empty());
    }

    #[tokio::test]
    async fn test_stale_write_drops_link() {
        let mut t = FixtureTransport::lite_dummy().with_stale_writes(1);
        t.connect("dummy").await.unwrap();
        assert!(matches!(
            t.write(LITE_WRITE, &[0x80]).await,
            Err(Error::NotConnected)
        ));
        assert!(!t.is_connected().await);

        t.connect("dummy").await.unwrap();
        t.write(LITE_WRITE, &[0x80]).await.unwrap();
        assert_eq!(t.stats().connects, 2);
        assert_eq!(t.written().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let mut t = FixtureTransport::silent().with_connect_failures(2);
        assert!(t.connect("x").await.is_err());
        assert!(t.connect("x").await.is_err());
        t.connect("x").await.unwrap();
        t.connect("x").await.unwrap();
        assert_eq!(t.stats().connect_attempts, 4);
        assert_eq!(t.stats().connects, 1);
    }

    #[tokio::test]
    async fn test_disconnect_clears_inbox() {
        let mut t = FixtureTransport::lite_dummy();
        t.connect("dummy").await.unwrap();
        t.write(LITE_WRITE, &[0x80]).await.unwrap();
        t.disconnect().await.unwrap();
        t.disconnect().await.unwrap();
        t.connect("dummy").await.unwrap();
        assert_eq!(t.wait_for_notification(WAIT).await.unwrap(), None);
        assert_eq!(t.stats().disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_read_value() {
        let mut t = FixtureTransport::silent().with_read_value(vec![1, 2]);
        t.connect("x").await.unwrap();
        t.enable_notifications(LITE_NOTIFY).await.unwrap();
        assert_eq!(t.wait_for_notification(Duration::from_secs(1)).await.unwrap(), None);
        assert_eq!(t.read(LITE_NOTIFY).await.unwrap(), vec![1, 2]);
        assert_eq!(t.stats().reads, 1);
        assert_eq!(t.stats().subscriptions, 1);
    }

    #[tokio::test]
    async fn test_emulator_answers_lite_request() {
        let lite = LiteProtocol::default();
        let mut breezer = MockBreezer::new(DeviceModel::Lite);
        breezer.state_mut().fan_speed = 5;
        breezer.connect("lite").await.unwrap();

        let request = lite.encode_get();
        for packet in lite.packetize(&request.bytes) {
            breezer.write(LITE_WRITE, &packet).await.unwrap();
        }

        let mut reader = lite.new_frame_reader();
        while let Some(packet) = breezer.wait_for_notification(WAIT).await.unwrap() {
            reader.feed(&packet).unwrap();
        }
        let frame = reader.take_frame().unwrap();
        let state = lite
            .decode_frame(&frame, &request, &DeviceState::new())
            .unwrap();
        assert_eq!(state.fan_speed, 5);
    }

    #[tokio::test]
    async fn test_emulator_applies_multi_packet_set() {
        let lite = LiteProtocol::default();
        let mut breezer = MockBreezer::new(DeviceModel::Lite);
        breezer.connect("lite").await.unwrap();

        let mut wanted = DeviceState::new();
        wanted.power = true;
        wanted.light = true;
        wanted.fan_speed = 3;
        wanted.target_temp = 18;
        let command = lite.encode_set(&wanted, &mut FixedRandom::constant(0x11));
        let packets = lite.packetize(&command.bytes);
        assert_eq!(packets.len(), 2);
        for packet in &packets {
            breezer.write(LITE_WRITE, packet).await.unwrap();
        }

        assert!(breezer.state().power);
        assert!(breezer.state().light);
        assert_eq!(breezer.state().fan_speed, 3);
        assert_eq!(breezer.state().target_temp, 18);
        assert_eq!(breezer.rejected_frames(), 0);
        assert_eq!(breezer.wait_for_notification(WAIT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_emulator_s3_pair_and_set() {
        let s3 = S3Protocol;
        let mut breezer = MockBreezer::new(DeviceModel::S3);
        breezer.connect("s3").await.unwrap();

        let pair = s3.encode_pair().unwrap();
        breezer.write(S3_WRITE, &pair.bytes).await.unwrap();
        assert!(breezer.paired());

        let mut wanted = DeviceState::new();
        wanted.power = true;
        wanted.mode = Mode::Recirculation;
        wanted.fan_speed = 2;
        let command = s3.encode_set(&wanted, &mut FixedRandom::constant(0));
        breezer.write(S3_WRITE, &command.bytes).await.unwrap();
        assert_eq!(breezer.state().mode, Mode::Recirculation);
        assert_eq!(breezer.state().fan_speed, 2);
    }

    #[tokio::test]
    async fn test_emulator_read_without_notifications() {
        let s3 = S3Protocol;
        let mut breezer = MockBreezer::new(DeviceModel::S3).with_notifications(false);
        breezer.state_mut().target_temp = 23;
        breezer.connect("s3").await.unwrap();

        breezer.write(S3_WRITE, &s3.encode_get().bytes).await.unwrap();
        assert_eq!(breezer.wait_for_notification(WAIT).await.unwrap(), None);

        let frame = breezer.read(S3_NOTIFY).await.unwrap();
        let state = s3
            .decode_frame(&frame, &s3.encode_get(), &DeviceState::new())
            .unwrap();
        assert_eq!(state.target_temp, 23);
    }

    #[tokio::test]
    async fn test_emulator_rejects_garbage() {
        let mut breezer = MockBreezer::new(DeviceModel::Lite);
        breezer.connect("lite").await.unwrap();
        breezer.write(LITE_WRITE, &[0x80, 0x10, 0x00, 0x00]).await.unwrap();
        breezer.write(LITE_WRITE, &[0x41]).await.unwrap();
        assert_eq!(breezer.rejected_frames(), 2);

        assert!(matches!(
            breezer.write(LITE_NOTIFY, &[0x80]).await,
            Err(Error::WriteFailed { .. })
        ));
    }
}
