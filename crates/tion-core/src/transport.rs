//! Transport abstraction between the session and the BLE stack.
//!
//! The session never touches btleplug directly. Everything it needs from a
//! link to the breezer is expressed by [`Transport`], which is implemented by
//! [`BleTransport`](crate::ble::BleTransport) for real hardware and by the
//! transports in [`mock`](crate::mock) for offline use.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// A GATT link to one breezer.
///
/// A transport owns at most one connection at a time. Notifications that
/// arrive while nobody is waiting are buffered until
/// [`wait_for_notification`](Self::wait_for_notification) picks them up.
///
/// # Example
///
/// ```ignore
/// use tion_core::{Result, Transport};
///
/// async fn ping<T: Transport>(t: &mut T, address: &str) -> Result<bool> {
///     t.connect(address).await?;
///     let alive = t.is_connected().await;
///     t.disconnect().await?;
///     Ok(alive)
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the breezer at `address`.
    ///
    /// Connecting while already connected is a no-op.
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Drop the connection and any buffered notifications.
    ///
    /// Disconnecting while not connected is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is up, as far as the transport knows.
    async fn is_connected(&self) -> bool;

    /// Subscribe to notifications on `characteristic`.
    async fn enable_notifications(&mut self, characteristic: Uuid) -> Result<()>;

    /// Write one packet to `characteristic`.
    ///
    /// A write on a stale handle fails with
    /// [`Error::NotConnected`](crate::Error::NotConnected).
    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Read the current value of `characteristic` directly.
    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}
