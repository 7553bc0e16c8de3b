//! Bluetooth UUIDs for Tion breezers.
//!
//! This module contains the GATT UUIDs used to talk to Tion breezers
//! over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Tion Lite ---

/// Lite control service.
pub const LITE_SERVICE: Uuid = uuid!("98f00001-3788-83ea-453e-f52244709ddb");

/// Lite characteristic that accepts command packets.
pub const LITE_WRITE: Uuid = uuid!("98f00002-3788-83ea-453e-f52244709ddb");

/// Lite characteristic that notifies response packets.
pub const LITE_NOTIFY: Uuid = uuid!("98f00003-3788-83ea-453e-f52244709ddb");

// --- Tion S3 ---

/// S3 control service (Nordic UART layout).
pub const S3_SERVICE: Uuid = uuid!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");

/// S3 characteristic that accepts commands.
pub const S3_WRITE: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// S3 characteristic that notifies responses.
pub const S3_NOTIFY: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

// --- Standard descriptors ---

/// Client Characteristic Configuration Descriptor, written to enable notifications.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");
