//! Core BLE protocol library for Tion breezers.
//!
//! This crate speaks the binary protocol of Tion supply ventilation units
//! ("breezers") over Bluetooth Low Energy GATT.
//!
//! # Features
//!
//! - **Protocol codecs**: command encoding and response decoding for the Lite
//!   and S3 families
//! - **Reassembly**: multi-packet Lite frames rebuilt from notifications
//! - **Sessions**: connect, write, poll and decode with bounded waits and a
//!   reconnect on stale handles
//! - **Partial updates**: change a few fields, the rest is read back first
//! - **Offline testing**: fixture and emulator transports
//!
//! # Supported Devices
//!
//! | Device | Framing | Device info |
//! |--------|---------|-------------|
//! | Tion Lite | multi-packet, `0x3A` magic | yes |
//! | Tion S3 | one 20-byte packet | no |
//!
//! # Quick Start
//!
//! ```no_run
//! use tion_core::ble::BleTransport;
//! use tion_core::{Breezer, DeviceModel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut breezer = Breezer::for_model(BleTransport::new(), "AA:BB:CC:DD:EE:FF", DeviceModel::S3);
//!
//!     let state = breezer.get(false).await?;
//!     println!("Fan speed {}, inlet {}°C", state.fan_speed, state.in_temp);
//!
//!     let update = serde_json::json!({"heater": "on", "target_temp": 20});
//!     breezer.set(update.as_object().unwrap(), false).await?;
//!     Ok(())
//! }
//! ```
//!
//! Without hardware, swap the transport for one from [`mock`]:
//!
//! ```
//! use tion_core::mock::FixtureTransport;
//! use tion_core::{Breezer, DeviceModel, Mode};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut breezer = Breezer::for_model(FixtureTransport::lite_dummy(), "dummy", DeviceModel::Lite);
//! let state = breezer.get(false).await.unwrap();
//! assert_eq!(state.mode, Mode::Outside);
//! assert_eq!(state.target_temp, 15);
//! # }
//! ```

pub mod ble;
pub mod commands;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod random;
pub mod reassembly;
pub mod retry;
pub mod session;
pub mod transport;

pub use tion_types::types;
pub use tion_types::uuids;

pub use commands::{Command, CommandKind};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use protocol::{BreezerProtocol, FrameReader, LiteProtocol, ProtocolVariant, S3Protocol};
pub use random::{FixedRandom, RandomSource, ThreadRandom};
pub use reassembly::{Reassembler, ReassemblyState};
pub use retry::{RetryConfig, with_retry};
pub use session::{Breezer, SessionConfig, SessionPhase, SharedBreezer};
pub use tion_types::{DecodeError, DeviceModel, DeviceState, FieldError, Mode, Presets};
pub use transport::Transport;
