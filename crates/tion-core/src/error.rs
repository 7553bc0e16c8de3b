//! Error types for tion-core.
//!
//! This module defines all error types that can occur when talking to a
//! Tion breezer over Bluetooth Low Energy.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Timeout`] | Retry | The breezer did not answer within the poll budget |
//! | [`Error::Bluetooth`] | Retry, then reconnect | May be transient or connection lost |
//! | [`Error::NotConnected`] | Reconnect | Stale connection handle |
//! | [`Error::ConnectionFailed`] | Retry with backoff | Device may be busy with another central |
//! | [`Error::WriteFailed`] | Retry | BLE writes can fail transiently |
//! | [`Error::Decode`] | Do not retry | The breezer answered with malformed data |
//! | [`Error::Field`] | Do not retry | The caller asked for an invalid update |
//! | [`Error::NoState`] | Do not retry | No baseline state could be read |
//! | [`Error::DeviceNotFound`] | Do not retry | Device not in range or wrong address |
//!
//! [`Error::is_transport`] separates "device unreachable" from "device
//! answered with garbage", which callers usually report differently.

use std::time::Duration;

use thiserror::Error;

use tion_types::{DecodeError, DeviceModel, FieldError};

/// Errors that can occur when communicating with Tion breezers.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted without a live connection, or on a stale handle.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The breezer answered with a frame that could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A state update was rejected before anything was sent.
    #[error("Invalid update: {0}")]
    Field(#[from] FieldError),

    /// `set` could not obtain a valid baseline state to encode from.
    #[error("No valid device state available")]
    NoState,

    /// The operation is not available for this breezer model.
    #[error("Operation '{operation}' is not supported by {model}")]
    Unsupported {
        /// The rejected operation.
        operation: &'static str,
        /// The breezer model.
        model: DeviceModel,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Device is out of range.
    OutOfRange,
    /// Device rejected the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified address not found.
    NotFound { identifier: String },
    /// Scan timed out before finding device.
    ScanTimeout { duration: Duration },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::ScanTimeout { duration } => write!(f, "scan timed out after {:?}", duration),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a write failure.
    pub fn write_failed(uuid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Whether the operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Bluetooth(_) => true,
            Error::ConnectionFailed { reason, .. } => matches!(
                reason,
                ConnectionFailureReason::OutOfRange
                    | ConnectionFailureReason::Timeout
                    | ConnectionFailureReason::BleError(_)
                    | ConnectionFailureReason::Other(_)
            ),
            Error::NotConnected => true,
            Error::WriteFailed { .. } => true,
            Error::DeviceNotFound(_) => false,
            Error::CharacteristicNotFound { .. } => false,
            Error::Decode(_) => false,
            Error::Field(_) => false,
            Error::NoState => false,
            Error::Unsupported { .. } => false,
            Error::InvalidConfig(_) => false,
        }
    }

    /// Whether the error means the breezer could not be reached, as opposed
    /// to the breezer answering with data that could not be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Bluetooth(_)
                | Error::DeviceNotFound(_)
                | Error::NotConnected
                | Error::CharacteristicNotFound { .. }
                | Error::Timeout { .. }
                | Error::ConnectionFailed { .. }
                | Error::WriteFailed { .. }
        )
    }
}

/// Result type alias using tion-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("98f00002", 3);
        assert!(err.to_string().contains("98f00002"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::timeout("get", Duration::from_secs(10));
        assert!(err.to_string().contains("get"));
        assert!(err.to_string().contains("10s"));

        let err = Error::Unsupported {
            operation: "get_device_info",
            model: DeviceModel::S3,
        };
        assert_eq!(
            err.to_string(),
            "Operation 'get_device_info' is not supported by Tion S3"
        );
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: Error = DecodeError::UnknownPacketId(0x41).into();
        assert!(matches!(err, Error::Decode(DecodeError::UnknownPacketId(0x41))));
        assert!(!err.is_transport());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_field_error_conversion() {
        let err: Error = FieldError::UnknownField("turbo".into()).into();
        assert!(err.to_string().contains("turbo"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout("test", Duration::from_secs(1)).is_retryable());
        assert!(Error::NotConnected.is_retryable());
        assert!(
            Error::connection_failed(None, ConnectionFailureReason::Other("busy".into()))
                .is_retryable()
        );
        assert!(
            !Error::connection_failed(None, ConnectionFailureReason::Rejected).is_retryable()
        );
        assert!(!Error::NoState.is_retryable());
        assert!(!Error::device_not_found("x").is_retryable());
    }

    #[test]
    fn test_is_transport() {
        assert!(Error::NotConnected.is_transport());
        assert!(Error::timeout("poll", Duration::from_secs(1)).is_transport());
        assert!(Error::write_failed("98f00002", "gatt error").is_transport());
        assert!(!Error::NoState.is_transport());
        assert!(!Error::invalid_config("bad").is_transport());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
