//! BLE command constants for Tion breezers.
//!
//! This module contains the command bytes used by the Lite and S3 protocols,
//! and the [`Command`] type the codecs produce.

use core::fmt;

use bytes::Bytes;

// --- Lite ---

/// Request current parameters.
/// Format: `[SINGLE, 0x10, 0x00, MAGIC, 0x02, 0x32, 0x12, id(4), suffix(4), TRAILER]`
pub const LITE_REQUEST_PARAMS: [u8; 2] = [0x32, 0x12];

/// Opcode of the answer to [`LITE_REQUEST_PARAMS`].
pub const LITE_RESPONSE_PARAMS: [u8; 2] = [0x31, 0x12];

/// Request device information (firmware version).
/// Format: `[SINGLE, 0x10, 0x00, MAGIC, 0x02, 0x09, 0x40, id(4), suffix(3), TRAILER]`
pub const LITE_REQUEST_DEVICE_INFO: [u8; 2] = [0x09, 0x40];

/// Opcode of the answer to [`LITE_REQUEST_DEVICE_INFO`].
pub const LITE_RESPONSE_DEVICE_INFO: [u8; 2] = [0x0A, 0x40];

/// Write all parameters.
pub const LITE_SET_PARAMS: [u8; 2] = [0x30, 0x12];

/// Correlation id carried by every Lite request.
pub const LITE_REQUEST_ID: [u8; 4] = [0x0D, 0xD7, 0x1F, 0x8F];

/// Constant command bytes that follow the id in a params request.
pub const LITE_REQUEST_PARAMS_SUFFIX: [u8; 4] = [0x48, 0xD3, 0xC3, 0x1A];

/// Constant command bytes that follow the id in a device info request.
pub const LITE_REQUEST_DEVICE_INFO_SUFFIX: [u8; 3] = [0x3C, 0x9F, 0xE9];

// --- S3 ---

/// First byte of every S3 command.
pub const S3_PREFIX: u8 = 0x3D;

/// Last byte of every S3 command.
pub const S3_SUFFIX: u8 = 0x5A;

/// Request current parameters.
pub const S3_REQUEST_PARAMS: u8 = 0x01;

/// Write parameters.
/// Format: `[PREFIX, 0x02, fan, target, mode, flags, 0.., SUFFIX]`
pub const S3_SET_PARAMS: u8 = 0x02;

/// Pair with the breezer. Sent with the special flag set.
pub const S3_PAIR: u8 = 0x05;

/// Length of every S3 command.
pub const S3_COMMAND_LEN: usize = 20;

/// What a command asks the breezer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Read current parameters.
    RequestParams,
    /// Read device information.
    RequestDeviceInfo,
    /// Write all parameters.
    SetParams,
    /// Pair with the breezer.
    Pair,
}

impl CommandKind {
    /// Whether the breezer answers this command with a notification.
    #[must_use]
    pub fn expects_response(self) -> bool {
        matches!(self, CommandKind::RequestParams | CommandKind::RequestDeviceInfo)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::RequestParams => write!(f, "request_params"),
            CommandKind::RequestDeviceInfo => write!(f, "request_device_info"),
            CommandKind::SetParams => write!(f, "set_params"),
            CommandKind::Pair => write!(f, "pair"),
        }
    }
}

/// An encoded command, ready to be split into packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// What the command does.
    pub kind: CommandKind,
    /// Id the response must echo, if the protocol has one.
    pub correlation: Option<[u8; 4]>,
    /// Encoded frame.
    pub bytes: Bytes,
}

impl Command {
    /// Create a command without a correlation id.
    pub fn new(kind: CommandKind, bytes: impl Into<Bytes>) -> Self {
        Self {
            kind,
            correlation: None,
            bytes: bytes.into(),
        }
    }

    /// Attach the correlation id the response must echo.
    #[must_use]
    pub fn with_correlation(mut self, id: [u8; 4]) -> Self {
        self.correlation = Some(id);
        self
    }

    /// Hex dump of the encoded bytes, for logging.
    #[must_use]
    pub fn hex(&self) -> String {
        hex(&self.bytes)
    }
}

/// Lowercase hex without separators, the way captures are written down.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
