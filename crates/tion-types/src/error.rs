//! Error types for frame decoding and state updates in tion-types.

use thiserror::Error;

/// Errors that can occur when decoding breezer frames.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in tion-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The leading byte of a packet is not a known packet role.
    #[error("Unknown packet id: 0x{0:02X}")]
    UnknownPacketId(u8),

    /// The frame header does not carry the protocol magic number.
    #[error("Wrong magic number at header[3]: expected 0x{expected:02X}, got 0x{found:02X}")]
    InvalidMagic {
        /// The expected magic number.
        expected: u8,
        /// The byte actually found.
        found: u8,
    },

    /// Not enough bytes to decode the frame.
    #[error("Truncated frame: requires {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// The frame trailer does not match the fixed sentinel pair.
    #[error("Trailer mismatch: expected {expected:02X?}, got {found:02X?}")]
    TrailerMismatch {
        /// The expected trailer.
        expected: [u8; 2],
        /// The trailer actually found.
        found: [u8; 2],
    },

    /// The response does not echo the request correlation id.
    #[error("Correlation id mismatch: sent {sent:02X?}, received {received:02X?}")]
    CorrelationMismatch {
        /// Id carried by the request.
        sent: [u8; 4],
        /// Id echoed by the response.
        received: [u8; 4],
    },

    /// The response carries an opcode this decoder does not handle.
    #[error("Unexpected response opcode {0:02X?}")]
    UnexpectedOpcode([u8; 2]),
}

/// Errors raised when applying a partial update to a [`DeviceState`](crate::DeviceState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FieldError {
    /// The update references a field the state model does not know.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The update references a field that is reported by the device but cannot be written.
    #[error("Field '{0}' is read-only")]
    ReadOnly(String),

    /// The value supplied for a field has the wrong type or is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The field being updated.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl FieldError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for frame decoding.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
