//! btleplug-backed [`Transport`].
//!
//! [`BleTransport`] finds the breezer by address or name, connects,
//! discovers services and caches the characteristics. It carries no protocol
//! logic: packets go out as given and notifications come back as received.
//!
//! ```no_run
//! use tion_core::ble::BleTransport;
//! use tion_core::{Breezer, DeviceModel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut breezer = Breezer::for_model(BleTransport::new(), "AA:BB:CC:DD:EE:FF", DeviceModel::Lite);
//!     let state = breezer.get(false).await?;
//!     println!("fan speed {}", state.fan_speed);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tion_types::DeviceModel;
use tion_types::uuids::{CLIENT_CHARACTERISTIC_CONFIG, LITE_SERVICE, S3_SERVICE};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::transport::Transport;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

const ZERO_ADDRESS: &str = "00:00:00:00:00:00";

/// Timeouts and scan behaviour of a [`BleTransport`].
///
/// ```
/// use std::time::Duration;
/// use tion_core::ble::BleConfig;
///
/// let config = BleConfig::default().scan_duration(Duration::from_secs(10));
/// assert_eq!(config.scan_duration, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BleConfig {
    /// Length of one scan window when the breezer is not yet known.
    pub scan_duration: Duration,
    /// Backoff between scan windows.
    pub scan_retry: RetryConfig,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
    /// Timeout for one characteristic read.
    pub read_timeout: Duration,
    /// Timeout for one characteristic write.
    pub write_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(5),
            scan_retry: RetryConfig::for_scan(),
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl BleConfig {
    /// Set the scan window.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the scan backoff.
    #[must_use]
    pub fn scan_retry(mut self, retry: RetryConfig) -> Self {
        self.scan_retry = retry;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// A breezer seen while scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredBreezer {
    /// Advertised name.
    pub name: Option<String>,
    /// Address, or the peripheral id where the platform hides addresses.
    pub identifier: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Model, if the advertised services tell.
    pub model: Option<DeviceModel>,
}

/// GATT link to a breezer through btleplug.
pub struct BleTransport {
    config: BleConfig,
    adapter: Option<Adapter>,
    peripheral: Option<Peripheral>,
    characteristics: HashMap<Uuid, Characteristic>,
    notifications: Option<Mutex<NotificationStream>>,
    subscribed: Option<Uuid>,
}

impl fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleTransport")
            .field("config", &self.config)
            .field("connected", &self.peripheral.is_some())
            .field("characteristics", &self.characteristics.len())
            .field("subscribed", &self.subscribed)
            .finish_non_exhaustive()
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BleTransport {
    /// Create a transport with default timeouts. Nothing happens until `connect`.
    pub fn new() -> Self {
        Self::with_config(BleConfig::default())
    }

    /// Create a transport with `config`.
    pub fn with_config(config: BleConfig) -> Self {
        Self {
            config,
            adapter: None,
            peripheral: None,
            characteristics: HashMap::new(),
            notifications: None,
            subscribed: None,
        }
    }

    /// Use a specific adapter instead of the first one found.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Current config.
    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    async fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }
        let adapter = get_adapter().await?;
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn peripheral(&self) -> Result<&Peripheral> {
        self.peripheral.as_ref().ok_or(Error::NotConnected)
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        let peripheral = self.peripheral()?;
        self.characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), peripheral.services().len()))
    }

    /// A stale handle looks connected to us but not to the stack.
    async fn live_peripheral(&self) -> Result<&Peripheral> {
        let peripheral = self.peripheral()?;
        if peripheral.is_connected().await.unwrap_or(false) {
            Ok(peripheral)
        } else {
            Err(Error::NotConnected)
        }
    }

    fn forget_connection(&mut self) {
        self.peripheral = None;
        self.characteristics.clear();
        self.notifications = None;
        self.subscribed = None;
    }
}

fn map_ble_error(uuid: Uuid, error: btleplug::Error) -> Error {
    match error {
        btleplug::Error::NotConnected => Error::NotConnected,
        other => Error::write_failed(uuid.to_string(), other.to_string()),
    }
}

#[async_trait]
impl Transport for BleTransport {
    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&mut self, address: &str) -> Result<()> {
        if self.is_connected().await {
            return Ok(());
        }
        self.forget_connection();

        let adapter = self.adapter().await?;
        let identifier = address.to_lowercase();
        let window = self.config.scan_duration;
        let peripheral = with_retry(&self.config.scan_retry, "find breezer", || {
            find_peripheral(&adapter, &identifier, window)
        })
        .await
        .map_err(|e| match e {
            Error::Timeout { .. } => Error::device_not_found(address),
            other => other,
        })?;

        info!("Connecting to breezer...");
        timeout(self.config.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to breezer", self.config.connect_timeout))??;

        timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;

        for service in peripheral.services() {
            debug!("Service: {}", service.uuid);
            for characteristic in service.characteristics {
                debug!("  Characteristic: {}", characteristic.uuid);
                self.characteristics
                    .insert(characteristic.uuid, characteristic);
            }
        }
        info!(
            "Connected, cached {} characteristics",
            self.characteristics.len()
        );

        self.peripheral = Some(peripheral);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };
        self.forget_connection();
        if peripheral.is_connected().await.unwrap_or(false) {
            info!("Disconnecting from breezer");
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match &self.peripheral {
            Some(p) => p.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn enable_notifications(&mut self, characteristic: Uuid) -> Result<()> {
        if self.subscribed == Some(characteristic) && self.notifications.is_some() {
            return Ok(());
        }
        let c = self.find_characteristic(characteristic)?;
        if !has_cccd(c.descriptors.iter().map(|d| &d.uuid)) {
            // some stacks do not report descriptors at all
            debug!("{} lists no CCCD descriptor", characteristic);
        }
        let peripheral = self.live_peripheral().await?;
        peripheral.subscribe(&c).await?;
        let stream = peripheral.notifications().await?;
        debug!("Subscribed to {}", characteristic);

        self.notifications = Some(Mutex::new(stream));
        self.subscribed = Some(characteristic);
        Ok(())
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let c = self.find_characteristic(characteristic)?;
        let peripheral = self.live_peripheral().await?;
        timeout(
            self.config.write_timeout,
            peripheral.write(&c, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| Error::timeout(format!("write {}", characteristic), self.config.write_timeout))?
        .map_err(|e| map_ble_error(characteristic, e))
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>> {
        let c = self.find_characteristic(characteristic)?;
        let peripheral = self.live_peripheral().await?;
        let data = timeout(self.config.read_timeout, peripheral.read(&c))
            .await
            .map_err(|_| Error::timeout(format!("read {}", characteristic), self.config.read_timeout))??;
        Ok(data)
    }

    async fn wait_for_notification(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        self.peripheral()?;
        let subscribed = self.subscribed;
        let Some(stream) = self.notifications.as_mut() else {
            sleep(wait).await;
            return Ok(None);
        };
        let stream = stream.get_mut();

        let deadline = Instant::now() + wait;
        loop {
            match timeout_at(deadline, stream.next()).await {
                Err(_) => return Ok(None),
                Ok(None) => {
                    warn!("Notification stream ended, connection lost");
                    self.forget_connection();
                    return Err(Error::NotConnected);
                }
                Ok(Some(n)) if Some(n.uuid) == subscribed => return Ok(Some(n.value)),
                Ok(Some(n)) => debug!("Ignoring notification from {}", n.uuid),
            }
        }
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for `duration` and list the breezers seen.
pub async fn scan_for_breezers(adapter: &Adapter, duration: Duration) -> Result<Vec<DiscoveredBreezer>> {
    info!("Scanning for breezers for {:?}...", duration);
    adapter.start_scan(ScanFilter::default()).await?;
    sleep(duration).await;
    adapter.stop_scan().await?;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let model = model_from_services(&props.services);
        let named = props
            .local_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains("tion") || n.to_lowercase().contains("breezer"));
        if model.is_none() && !named {
            continue;
        }
        found.push(DiscoveredBreezer {
            name: props.local_name.clone(),
            identifier: create_identifier(&props.address.to_string(), &peripheral.id()),
            rssi: props.rssi,
            model,
        });
    }
    info!("Scan complete, found {} breezer(s)", found.len());
    Ok(found)
}

/// One scan window looking for `identifier_lower`. Not finding it is a timeout.
async fn find_peripheral(adapter: &Adapter, identifier_lower: &str, window: Duration) -> Result<Peripheral> {
    if let Some(peripheral) = find_known_peripheral(adapter, identifier_lower).await? {
        debug!("Breezer already known to the adapter");
        return Ok(peripheral);
    }

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(window).await;
    adapter.stop_scan().await?;

    find_known_peripheral(adapter, identifier_lower)
        .await?
        .ok_or_else(|| Error::timeout(format!("scan for {}", identifier_lower), window))
}

async fn find_known_peripheral(adapter: &Adapter, identifier_lower: &str) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await
            && matches_identifier(
                &format_peripheral_id(&peripheral.id()),
                &props.address.to_string(),
                props.local_name.as_deref(),
                identifier_lower,
            )
        {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

/// Whether a characteristic's descriptors include the CCCD that enables notifications.
fn has_cccd<'a>(descriptors: impl IntoIterator<Item = &'a Uuid>) -> bool {
    descriptors
        .into_iter()
        .any(|uuid| *uuid == CLIENT_CHARACTERISTIC_CONFIG)
}

fn matches_identifier(
    peripheral_id: &str,
    address: &str,
    name: Option<&str>,
    identifier_lower: &str,
) -> bool {
    if peripheral_id.to_lowercase().contains(identifier_lower) {
        debug!("Matched by peripheral id: {}", peripheral_id);
        return true;
    }
    if address_matches(address, identifier_lower) {
        debug!("Matched by address: {}", address);
        return true;
    }
    if let Some(name) = name
        && name.to_lowercase().contains(identifier_lower)
    {
        debug!("Matched by name: {}", name);
        return true;
    }
    false
}

/// Compare addresses ignoring case and separators. The all-zero address never matches.
fn address_matches(address: &str, identifier_lower: &str) -> bool {
    let address = address.to_lowercase();
    if address == ZERO_ADDRESS {
        return false;
    }
    address.replace([':', '-'], "") == identifier_lower.replace([':', '-'], "")
}

fn model_from_services(services: &[Uuid]) -> Option<DeviceModel> {
    services.iter().find_map(|s| {
        if *s == LITE_SERVICE {
            Some(DeviceModel::Lite)
        } else if *s == S3_SERVICE {
            Some(DeviceModel::S3)
        } else {
            None
        }
    })
}

fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Address where the platform exposes it, peripheral id otherwise (macOS).
fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == ZERO_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BleConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.scan_retry, RetryConfig::for_scan());

        let config = config
            .connect_timeout(Duration::from_secs(3))
            .write_timeout(Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.write_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_address_matches() {
        assert!(address_matches("AA:BB:CC:DD:EE:FF", "aa:bb:cc:dd:ee:ff"));
        assert!(address_matches("AA:BB:CC:DD:EE:FF", "aabbccddeeff"));
        assert!(address_matches("AA:BB:CC:DD:EE:FF", "aa-bb-cc-dd-ee-ff"));
        assert!(!address_matches("AA:BB:CC:DD:EE:FF", "aa:bb:cc:dd:ee:00"));
        assert!(!address_matches(ZERO_ADDRESS, "000000000000"));
    }

    #[test]
    fn test_model_from_services() {
        assert_eq!(model_from_services(&[LITE_SERVICE]), Some(DeviceModel::Lite));
        assert_eq!(
            model_from_services(&[Uuid::nil(), S3_SERVICE]),
            Some(DeviceModel::S3)
        );
        assert_eq!(model_from_services(&[Uuid::nil()]), None);
    }

    #[test]
    fn test_has_cccd() {
        assert!(has_cccd(&[Uuid::nil(), CLIENT_CHARACTERISTIC_CONFIG]));
        assert!(!has_cccd(&[Uuid::nil()]));
        assert!(!has_cccd(std::iter::empty()));
    }

    #[test]
    fn test_matches_identifier_by_name() {
        let name = Some("Tion Breezer Lite");
        assert!(matches_identifier("hci0/dev_x", ZERO_ADDRESS, name, "breezer lite"));
        assert!(!matches_identifier("hci0/dev_x", ZERO_ADDRESS, name, "tion s3"));
        assert!(matches_identifier("hci0/dev_x", "AA:BB:CC:DD:EE:FF", None, "aabbccddeeff"));
    }

    #[tokio::test]
    async fn test_disconnected_transport() {
        let mut t = BleTransport::new();
        assert!(!t.is_connected().await);
        t.disconnect().await.unwrap();
        assert!(matches!(
            t.write(Uuid::nil(), &[1]).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            t.wait_for_notification(Duration::from_millis(1)).await,
            Err(Error::NotConnected)
        ));
    }
}
