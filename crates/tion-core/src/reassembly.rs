//! Reassembly of multi-packet Lite frames.
//!
//! The breezer answers with a sequence of 20-byte notifications. Feed them one
//! at a time into a [`Reassembler`] and check [`Reassembler::is_complete`]
//! after each call.
//!
//! ```
//! use tion_core::reassembly::Reassembler;
//!
//! let mut r = Reassembler::new();
//! r.feed(&[0x80, 0x10, 0x00, 0x3A, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xBB, 0xAA]).unwrap();
//! assert!(r.is_complete());
//! let frame = r.take_frame().unwrap();
//! assert!(frame.is_empty());
//! ```

use tracing::{debug, warn};

use tion_types::DecodeResult;
use tion_types::framing::{PacketRole, RawFrame, classify};

/// Where the reassembler is in the current sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblyState {
    /// Waiting for a `First` or `Single` packet.
    #[default]
    Idle,
    /// A `First` packet arrived; collecting continuation packets.
    Accumulating,
    /// A complete frame is ready to be taken.
    Complete,
    /// The last packet could not be used. A new `First` or `Single` recovers.
    Error,
}

/// Stateful collector turning packets into frames.
#[derive(Debug, Default)]
pub struct Reassembler {
    state: ReassemblyState,
    buffer: Vec<u8>,
    frame: Option<RawFrame>,
}

impl Reassembler {
    /// Create an idle reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Whether a complete frame is waiting in [`take_frame`](Self::take_frame).
    pub fn is_complete(&self) -> bool {
        self.state == ReassemblyState::Complete
    }

    /// Take the completed frame, returning to `Idle`.
    pub fn take_frame(&mut self) -> Option<RawFrame> {
        if self.state != ReassemblyState::Complete {
            return None;
        }
        self.state = ReassemblyState::Idle;
        self.frame.take()
    }

    /// Drop any partial or completed frame.
    pub fn reset(&mut self) {
        self.state = ReassemblyState::Idle;
        self.buffer.clear();
        self.frame = None;
    }

    /// Feed one packet.
    ///
    /// `Middle` and `End` packets that arrive outside a sequence are logged
    /// and discarded without failing. A `First` or `Single` packet always
    /// starts over, dropping any partial frame.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::UnknownPacketId` for an unknown role byte, and the
    /// frame split errors of [`RawFrame::from_buffer`] when a completed buffer
    /// is malformed. Both leave the reassembler in [`ReassemblyState::Error`].
    pub fn feed(&mut self, packet: &[u8]) -> DecodeResult<()> {
        let Some(&byte0) = packet.first() else {
            warn!("Ignoring empty packet");
            return Ok(());
        };

        let role = match classify(byte0) {
            Ok(role) => role,
            Err(e) => {
                warn!("Unknown packet id 0x{:02X}, dropping partial frame", byte0);
                self.fail();
                return Err(e);
            }
        };

        match role {
            PacketRole::Single => {
                self.restart(role);
                self.buffer.extend_from_slice(packet);
                self.finish()
            }
            PacketRole::First => {
                self.restart(role);
                self.buffer.extend_from_slice(packet);
                self.state = ReassemblyState::Accumulating;
                Ok(())
            }
            PacketRole::Middle | PacketRole::End => {
                if self.state != ReassemblyState::Accumulating {
                    warn!("Got {} packet before a first packet, discarding", role);
                    return Ok(());
                }
                self.buffer.extend_from_slice(&packet[1..]);
                if role == PacketRole::End {
                    self.finish()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn restart(&mut self, role: PacketRole) {
        if self.state == ReassemblyState::Accumulating {
            debug!(
                "Discarding {} partial bytes on new {} packet",
                self.buffer.len(),
                role
            );
        }
        self.buffer.clear();
        self.frame = None;
    }

    fn finish(&mut self) -> DecodeResult<()> {
        let buffer = std::mem::take(&mut self.buffer);
        match RawFrame::from_buffer(&buffer) {
            Ok(frame) => {
                if usize::from(frame.declared_size()) + 1 != buffer.len() {
                    debug!(
                        "Declared size {} does not match frame of {} bytes",
                        frame.declared_size(),
                        buffer.len()
                    );
                }
                self.frame = Some(frame);
                self.state = ReassemblyState::Complete;
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn fail(&mut self) {
        self.buffer.clear();
        self.frame = None;
        self.state = ReassemblyState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::LITE_DUMMY_PACKETS;
    use tion_types::DecodeError;

    fn feed_all(r: &mut Reassembler, packets: &[&[u8]]) {
        for p in packets {
            r.feed(p).unwrap();
        }
    }

    #[test]
    fn test_reassembles_fixture_sequence() {
        let mut r = Reassembler::new();
        for (i, packet) in LITE_DUMMY_PACKETS.iter().enumerate() {
            r.feed(packet).unwrap();
            assert_eq!(r.is_complete(), i == LITE_DUMMY_PACKETS.len() - 1);
        }

        let frame = r.take_frame().unwrap();
        assert_eq!(frame.len(), 74);
        assert_eq!(frame.payload.len(), 57);
        assert_eq!(frame.declared_size(), 0x49);
        assert_eq!(frame.opcode(), [0x31, 0x12]);
        assert_eq!(frame.correlation_id(), [0x0D, 0xD7, 0x1F, 0x8F]);
        assert_eq!(frame.trailer, [0xB5, 0xAD]);
        assert_eq!(frame.payload[0], 0xCF);
        assert_eq!(r.state(), ReassemblyState::Idle);
    }

    #[test]
    fn test_split_matches_single_path() {
        let mut split = Reassembler::new();
        for packet in LITE_DUMMY_PACKETS {
            split.feed(packet).unwrap();
        }
        let split_frame = split.take_frame().unwrap();

        let mut whole = split_frame.to_vec();
        whole[0] = PacketRole::Single.id();
        let mut single = Reassembler::new();
        single.feed(&whole).unwrap();
        let mut single_frame = single.take_frame().unwrap();
        single_frame.header[0] = PacketRole::First.id();

        assert_eq!(single_frame, split_frame);
    }

    #[test]
    fn test_orphan_middle_and_end_never_complete() {
        let mut r = Reassembler::new();
        feed_all(&mut r, &[LITE_DUMMY_PACKETS[1], LITE_DUMMY_PACKETS[3]]);
        assert!(!r.is_complete());
        assert_eq!(r.state(), ReassemblyState::Idle);
        assert!(r.take_frame().is_none());
    }

    #[test]
    fn test_new_first_discards_partial() {
        let mut r = Reassembler::new();
        feed_all(&mut r, &[LITE_DUMMY_PACKETS[0], LITE_DUMMY_PACKETS[1]]);
        // restart: the whole sequence again yields the same 74 bytes
        feed_all(&mut r, LITE_DUMMY_PACKETS);
        assert_eq!(r.take_frame().unwrap().len(), 74);
    }

    #[test]
    fn test_unknown_id_errors_then_recovers() {
        let mut r = Reassembler::new();
        r.feed(LITE_DUMMY_PACKETS[0]).unwrap();
        assert_eq!(
            r.feed(&[0x41, 0x00]),
            Err(DecodeError::UnknownPacketId(0x41))
        );
        assert_eq!(r.state(), ReassemblyState::Error);

        // continuation after an error is an orphan
        r.feed(LITE_DUMMY_PACKETS[1]).unwrap();
        assert_eq!(r.state(), ReassemblyState::Error);

        feed_all(&mut r, LITE_DUMMY_PACKETS);
        assert!(r.is_complete());
    }

    #[test]
    fn test_bad_magic_is_error() {
        let mut r = Reassembler::new();
        let mut first = LITE_DUMMY_PACKETS[0].to_vec();
        first[3] = 0x00;
        r.feed(&first).unwrap();
        r.feed(LITE_DUMMY_PACKETS[1]).unwrap();
        r.feed(LITE_DUMMY_PACKETS[2]).unwrap();
        assert!(matches!(
            r.feed(LITE_DUMMY_PACKETS[3]),
            Err(DecodeError::InvalidMagic { found: 0x00, .. })
        ));
        assert!(!r.is_complete());
    }

    #[test]
    fn test_short_single_is_truncated() {
        let mut r = Reassembler::new();
        assert!(matches!(
            r.feed(&[0x80, 0x10, 0x00, 0x3A]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut r = Reassembler::new();
        r.feed(LITE_DUMMY_PACKETS[0]).unwrap();
        r.reset();
        assert_eq!(r.state(), ReassemblyState::Idle);
        r.feed(LITE_DUMMY_PACKETS[3]).unwrap();
        assert!(!r.is_complete());
    }

    #[test]
    fn test_empty_packet_ignored() {
        let mut r = Reassembler::new();
        r.feed(&[]).unwrap();
        assert_eq!(r.state(), ReassemblyState::Idle);
    }
}
