//! Packet framing primitives shared by the breezer protocol variants.
//!
//! A Lite frame on the wire is split into 20-byte BLE payloads. The first
//! byte of every payload tags its position in the logical frame:
//!
//! | Byte | Role |
//! |------|------|
//! | `0x80` | [`PacketRole::Single`] |
//! | `0x00` | [`PacketRole::First`] |
//! | `0x40` | [`PacketRole::Middle`] |
//! | `0xC0` | [`PacketRole::End`] |
//!
//! A reassembled frame is `header[0..15] ++ payload ++ trailer[2]`.

use core::fmt;

use bytes::Bytes;

use crate::error::{DecodeError, DecodeResult};

/// Magic number carried at `header[3]` of every Lite frame.
pub const MAGIC: u8 = 0x3A;

/// Fixed trailer appended to outbound Lite commands.
pub const TRAILER: [u8; 2] = [0xBB, 0xAA];

/// Size of the Lite frame header.
pub const HEADER_LEN: usize = 15;

/// Size of the Lite frame trailer.
pub const TRAILER_LEN: usize = 2;

/// Maximum size of a single BLE payload.
pub const PACKET_LEN: usize = 20;

/// Position of a single wireless payload within a logical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketRole {
    /// The whole frame fits in this packet.
    Single = 0x80,
    /// First packet of a multi-packet frame.
    First = 0x00,
    /// Continuation packet.
    Middle = 0x40,
    /// Last packet of a multi-packet frame.
    End = 0xC0,
}

impl PacketRole {
    /// The leading byte that tags this role on the wire.
    #[must_use]
    pub fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketRole {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        classify(value)
    }
}

impl fmt::Display for PacketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketRole::Single => write!(f, "single"),
            PacketRole::First => write!(f, "first"),
            PacketRole::Middle => write!(f, "middle"),
            PacketRole::End => write!(f, "end"),
        }
    }
}

/// Classify a packet by its leading byte.
///
/// # Examples
///
/// ```
/// use tion_types::framing::{classify, PacketRole};
///
/// assert_eq!(classify(0x80), Ok(PacketRole::Single));
/// assert_eq!(classify(0xC0), Ok(PacketRole::End));
/// assert!(classify(0x12).is_err());
/// ```
pub fn classify(byte0: u8) -> DecodeResult<PacketRole> {
    match byte0 {
        0x80 => Ok(PacketRole::Single),
        0x00 => Ok(PacketRole::First),
        0x40 => Ok(PacketRole::Middle),
        0xC0 => Ok(PacketRole::End),
        other => Err(DecodeError::UnknownPacketId(other)),
    }
}

/// Extract bit `n` of `byte`.
#[inline]
#[must_use]
pub fn status_bit(byte: u8, n: u8) -> bool {
    (byte >> n) & 1 == 1
}

/// Decode a breezer temperature byte.
///
/// Temperatures are transmitted as a signed byte in two's complement
/// ("additional code"): `0x00..=0x7F` are positive, `0x80..=0xFF` negative.
///
/// ```
/// use tion_types::framing::decode_temperature;
///
/// assert_eq!(decode_temperature(21), 21);
/// assert_eq!(decode_temperature(0xFB), -5);
/// ```
#[inline]
#[must_use]
pub fn decode_temperature(raw: u8) -> i16 {
    i16::from(raw as i8)
}

/// Encode a temperature into its wire byte. Values outside `-128..=127` saturate.
#[inline]
#[must_use]
pub fn encode_temperature(value: i16) -> u8 {
    value.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8 as u8
}

/// Check that the last two bytes of `buf` are the fixed [`TRAILER`].
pub fn validate_trailer(buf: &[u8]) -> DecodeResult<()> {
    if buf.len() < TRAILER_LEN {
        return Err(DecodeError::Truncated {
            expected: TRAILER_LEN,
            actual: buf.len(),
        });
    }
    let found = [buf[buf.len() - 2], buf[buf.len() - 1]];
    if found == TRAILER {
        Ok(())
    } else {
        Err(DecodeError::TrailerMismatch {
            expected: TRAILER,
            found,
        })
    }
}

/// A complete Lite frame, split into its header, payload and trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The 15-byte frame header.
    pub header: [u8; HEADER_LEN],
    /// Frame body between header and trailer.
    pub payload: Bytes,
    /// The two trailing bytes.
    pub trailer: [u8; TRAILER_LEN],
}

impl RawFrame {
    /// Minimum size of a frame buffer (empty payload).
    pub const MIN_LEN: usize = HEADER_LEN + TRAILER_LEN;

    /// Split a reassembled buffer into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if the buffer cannot hold a header and
    /// trailer, and [`DecodeError::InvalidMagic`] if `header[3]` is not [`MAGIC`].
    pub fn from_buffer(buf: &[u8]) -> DecodeResult<Self> {
        if buf.len() < Self::MIN_LEN {
            return Err(DecodeError::Truncated {
                expected: Self::MIN_LEN,
                actual: buf.len(),
            });
        }
        if buf[3] != MAGIC {
            return Err(DecodeError::InvalidMagic {
                expected: MAGIC,
                found: buf[3],
            });
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[..HEADER_LEN]);
        let split = buf.len() - TRAILER_LEN;
        let trailer = [buf[split], buf[split + 1]];

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&buf[HEADER_LEN..split]),
            trailer,
        })
    }

    /// Frame size as declared by the device (`header[1]`).
    #[must_use]
    pub fn declared_size(&self) -> u8 {
        self.header[1]
    }

    /// Response opcode (`header[5..7]`).
    #[must_use]
    pub fn opcode(&self) -> [u8; 2] {
        [self.header[5], self.header[6]]
    }

    /// Correlation id echoed from the request (`header[7..11]`).
    #[must_use]
    pub fn correlation_id(&self) -> [u8; 4] {
        [
            self.header[7],
            self.header[8],
            self.header[9],
            self.header[10],
        ]
    }

    /// Total size of the frame on the wire, role byte included.
    #[must_use]
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len() + TRAILER_LEN
    }

    /// Whether the frame carries no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Reassemble the frame back into one contiguous buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.trailer);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(payload_len: usize) -> Vec<u8> {
        let mut buf = vec![0x00, 0x10, 0x00, MAGIC];
        buf.resize(HEADER_LEN, 0x11);
        buf.extend(std::iter::repeat_n(0x22, payload_len));
        buf.extend_from_slice(&TRAILER);
        buf
    }

    #[test]
    fn test_classify_known_roles() {
        assert_eq!(classify(0x80).unwrap(), PacketRole::Single);
        assert_eq!(classify(0x00).unwrap(), PacketRole::First);
        assert_eq!(classify(0x40).unwrap(), PacketRole::Middle);
        assert_eq!(classify(0xC0).unwrap(), PacketRole::End);
    }

    #[test]
    fn test_classify_unknown_role() {
        assert_eq!(classify(0x41), Err(DecodeError::UnknownPacketId(0x41)));
        assert_eq!(classify(0xFF), Err(DecodeError::UnknownPacketId(0xFF)));
    }

    #[test]
    fn test_role_id_roundtrip() {
        for role in [
            PacketRole::Single,
            PacketRole::First,
            PacketRole::Middle,
            PacketRole::End,
        ] {
            assert_eq!(PacketRole::try_from(role.id()).unwrap(), role);
        }
    }

    #[test]
    fn test_status_bit() {
        let byte = 0b1000_0101;
        assert!(status_bit(byte, 0));
        assert!(!status_bit(byte, 1));
        assert!(status_bit(byte, 2));
        assert!(status_bit(byte, 7));
    }

    #[test]
    fn test_decode_temperature() {
        assert_eq!(decode_temperature(0), 0);
        assert_eq!(decode_temperature(25), 25);
        assert_eq!(decode_temperature(0x7F), 127);
        assert_eq!(decode_temperature(0x80), -128);
        assert_eq!(decode_temperature(0xFF), -1);
        assert_eq!(decode_temperature(0xEC), -20);
    }

    #[test]
    fn test_encode_temperature_roundtrip_and_saturation() {
        for value in -128..=127 {
            assert_eq!(decode_temperature(encode_temperature(value)), value);
        }
        assert_eq!(encode_temperature(500), 0x7F);
        assert_eq!(encode_temperature(-500), 0x80);
    }

    #[test]
    fn test_validate_trailer() {
        assert!(validate_trailer(&[0x01, 0xBB, 0xAA]).is_ok());
        assert_eq!(
            validate_trailer(&[0x01, 0xB5, 0xAD]),
            Err(DecodeError::TrailerMismatch {
                expected: TRAILER,
                found: [0xB5, 0xAD],
            })
        );
        assert!(matches!(
            validate_trailer(&[0xBB]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_raw_frame_split() {
        let buf = frame_bytes(5);
        let frame = RawFrame::from_buffer(&buf).unwrap();
        assert_eq!(frame.header[3], MAGIC);
        assert_eq!(frame.payload.len(), 5);
        assert_eq!(frame.trailer, TRAILER);
        assert_eq!(frame.declared_size(), 0x10);
        assert_eq!(frame.to_vec(), buf);
    }

    #[test]
    fn test_raw_frame_rejects_wrong_magic() {
        let mut buf = frame_bytes(4);
        buf[3] = 0x3B;
        assert_eq!(
            RawFrame::from_buffer(&buf),
            Err(DecodeError::InvalidMagic {
                expected: MAGIC,
                found: 0x3B,
            })
        );
    }

    #[test]
    fn test_raw_frame_rejects_short_buffer() {
        let buf = [0x00, 0x10, 0x00, MAGIC, 0x00];
        assert!(matches!(
            RawFrame::from_buffer(&buf),
            Err(DecodeError::Truncated {
                expected: 17,
                actual: 5
            })
        ));
    }
}
