//! Session orchestration for one breezer.
//!
//! A [`Breezer`] owns a [`Transport`], a protocol codec and the last known
//! [`DeviceState`]. Each operation connects, writes a command, collects the
//! answer and disconnects again unless asked to keep the link open.
//!
//! The breezer answers on a lossy notification channel, so reading is a
//! bounded poll: up to [`SessionConfig::poll_attempts`] waits of
//! [`SessionConfig::poll_interval`], then one direct read of the notify
//! characteristic, then [`Error::Timeout`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use tion_types::{DeviceModel, DeviceState};

use crate::commands::{Command, hex};
use crate::error::{Error, Result};
use crate::protocol::{BreezerProtocol, LiteProtocol, ProtocolVariant};
use crate::random::{RandomSource, ThreadRandom};
use crate::retry::RetryConfig;
use crate::transport::Transport;

/// Default number of notification waits before falling back to a read.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;

/// Default length of one notification wait.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A [`Breezer`] shared between tasks.
///
/// # Example
///
/// ```
/// use tion_core::mock::FixtureTransport;
/// use tion_core::{Breezer, DeviceModel, SharedBreezer};
///
/// #[tokio::main]
/// async fn main() {
///     let breezer: SharedBreezer<FixtureTransport> =
///         Breezer::for_model(FixtureTransport::lite_dummy(), "dummy", DeviceModel::Lite).into_shared();
///
///     let handle = {
///         let breezer = breezer.clone();
///         tokio::spawn(async move { breezer.lock().await.get(false).await.map(|s| s.fan_speed) })
///     };
///     assert_eq!(handle.await.unwrap().unwrap(), 4);
/// }
/// ```
pub type SharedBreezer<T, P = ProtocolVariant> = Arc<Mutex<Breezer<T, P>>>;

/// Where the session is in the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No operation has run yet.
    #[default]
    Idle,
    /// Establishing the connection.
    Connecting,
    /// Writing command packets.
    Writing,
    /// Waiting for the first notification.
    AwaitingNotifications,
    /// Collecting the packets of a frame.
    Reassembling,
    /// A frame was decoded into the cached state.
    Decoded,
    /// No complete frame arrived in time.
    TimedOut,
    /// The operation failed.
    Failed,
    /// The connection was closed after a successful operation.
    Disconnected,
}

/// Session timing and decode options.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tion_core::SessionConfig;
///
/// let config = SessionConfig::default()
///     .poll_attempts(20)
///     .poll_interval(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Notification waits before falling back to a direct read.
    pub poll_attempts: u32,
    /// Length of one notification wait.
    pub poll_interval: Duration,
    /// Backoff used when connecting.
    pub connect_retry: RetryConfig,
    /// Reject Lite responses whose trailer is not `BB AA`.
    pub strict_trailer: bool,
    /// Reject Lite responses that do not echo the request id.
    pub verify_correlation: bool,
    /// Subscribe to the notify characteristic after connecting.
    pub enable_notifications: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_retry: RetryConfig::for_connect(),
            strict_trailer: false,
            verify_correlation: true,
            enable_notifications: true,
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Short waits for a breezer close by.
    pub fn fast() -> Self {
        Self {
            poll_attempts: 5,
            poll_interval: Duration::from_millis(500),
            connect_retry: RetryConfig::quick(),
            ..Self::default()
        }
    }

    /// Long waits for a breezer behind walls or busy with another central.
    pub fn patient() -> Self {
        Self {
            poll_attempts: 20,
            poll_interval: Duration::from_secs(1),
            connect_retry: RetryConfig::for_connect().max_retries(5),
            ..Self::default()
        }
    }

    /// Set the number of notification waits.
    #[must_use]
    pub fn poll_attempts(mut self, attempts: u32) -> Self {
        self.poll_attempts = attempts;
        self
    }

    /// Set the length of one notification wait.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the connection backoff.
    #[must_use]
    pub fn connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Enable or disable Lite trailer checks.
    #[must_use]
    pub fn strict_trailer(mut self, enabled: bool) -> Self {
        self.strict_trailer = enabled;
        self
    }

    /// Enable or disable Lite correlation id checks.
    #[must_use]
    pub fn verify_correlation(mut self, enabled: bool) -> Self {
        self.verify_correlation = enabled;
        self
    }

    /// Enable or disable the notification subscription.
    #[must_use]
    pub fn enable_notifications(mut self, enabled: bool) -> Self {
        self.enable_notifications = enabled;
        self
    }

    /// Upper bound on the time spent waiting for one answer, excluding the final read.
    pub fn poll_budget(&self) -> Duration {
        self.poll_interval.saturating_mul(self.poll_attempts)
    }

    /// Check the values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.poll_attempts == 0 {
            return Err(Error::invalid_config("poll_attempts must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll_interval must be non-zero"));
        }
        let multiplier = self.connect_retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(Error::invalid_config(
                "connect_retry.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// The codec for `model` with this config's decode checks.
    pub fn protocol_for(&self, model: DeviceModel) -> ProtocolVariant {
        match model {
            DeviceModel::Lite => LiteProtocol::new()
                .strict_trailer(self.strict_trailer)
                .verify_correlation(self.verify_correlation)
                .into(),
            DeviceModel::S3 => ProtocolVariant::for_model(model),
        }
    }
}

/// A session with one breezer.
///
/// Operations take `&mut self`, so one session runs one operation at a
/// time. Wrap it in a [`SharedBreezer`] to use it from several tasks.
pub struct Breezer<T, P = ProtocolVariant> {
    transport: T,
    protocol: P,
    address: String,
    config: SessionConfig,
    state: DeviceState,
    rng: Box<dyn RandomSource>,
    phase: SessionPhase,
    last_request: Option<Command>,
}

impl<T, P: BreezerProtocol> fmt::Debug for Breezer<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breezer")
            .field("address", &self.address)
            .field("model", &self.protocol.model())
            .field("phase", &self.phase)
            .field("has_valid_state", &self.state.has_valid_state)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Breezer<T, ProtocolVariant> {
    /// Create a session for a breezer of `model` with the default config.
    pub fn for_model(transport: T, address: impl Into<String>, model: DeviceModel) -> Self {
        let config = SessionConfig::default();
        let protocol = config.protocol_for(model);
        Self::build(transport, protocol, address.into(), config)
    }

    /// Create a session for a breezer of `model` with `config`.
    pub fn for_model_with_config(
        transport: T,
        address: impl Into<String>,
        model: DeviceModel,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let protocol = config.protocol_for(model);
        Ok(Self::build(transport, protocol, address.into(), config))
    }
}

impl<T: Transport, P: BreezerProtocol> Breezer<T, P> {
    /// Create a session speaking `protocol` with the default config.
    pub fn new(transport: T, address: impl Into<String>, protocol: P) -> Self {
        Self::build(transport, protocol, address.into(), SessionConfig::default())
    }

    /// Create a session speaking `protocol` with `config`.
    ///
    /// The decode options in `config` only apply to codecs built by
    /// [`SessionConfig::protocol_for`]; `protocol` is used as given.
    pub fn with_config(
        transport: T,
        address: impl Into<String>,
        protocol: P,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, protocol, address.into(), config))
    }

    fn build(transport: T, protocol: P, address: String, config: SessionConfig) -> Self {
        Self {
            transport,
            protocol,
            address,
            config,
            state: DeviceState::new(),
            rng: Box::new(ThreadRandom),
            phase: SessionPhase::Idle,
            last_request: None,
        }
    }

    /// Replace the source of filler bytes in outbound commands.
    #[must_use]
    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Wrap the session for use from several tasks.
    pub fn into_shared(self) -> SharedBreezer<T, P> {
        Arc::new(Mutex::new(self))
    }

    /// Last known state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Last known state as JSON, flags rendered as `"on"`/`"off"`.
    pub fn state_json(&self) -> Value {
        self.state.to_json()
    }

    /// Address the session connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Breezer family.
    pub fn model(&self) -> DeviceModel {
        self.protocol.model()
    }

    /// Codec in use.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Session config.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The last request sent that expected an answer.
    pub fn last_request(&self) -> Option<&Command> {
        self.last_request.as_ref()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Read the current parameters.
    ///
    /// On success the cached state is replaced and marked valid. On failure
    /// the cached state is left untouched and the connection is closed.
    /// With `keep_connection` the link stays open after a successful read.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address, model = %self.protocol.model()))]
    pub async fn get(&mut self, keep_connection: bool) -> Result<&DeviceState> {
        let request = self.protocol.encode_get();
        let state = self.exchange(request, keep_connection).await?;
        self.state = state;
        self.state.has_valid_state = true;
        Ok(&self.state)
    }

    /// Read the firmware version.
    ///
    /// Only Lite breezers answer this request; other models give
    /// [`Error::Unsupported`].
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    pub async fn get_device_info(&mut self) -> Result<&str> {
        let Some(request) = self.protocol.encode_device_info() else {
            return Err(Error::Unsupported {
                operation: "get_device_info",
                model: self.protocol.model(),
            });
        };
        self.state = self.exchange(request, false).await?;
        Ok(&self.state.firmware_version)
    }

    /// Apply `update` and write the resulting state.
    ///
    /// The update is checked before anything is sent. The current state is
    /// read first when `need_update` is set or nothing valid is cached. The
    /// connection is always closed afterwards. Returns the packets written.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use tion_core::mock::MockBreezer;
    /// use tion_core::{Breezer, DeviceModel};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let mut breezer = Breezer::for_model(MockBreezer::new(DeviceModel::S3), "s3", DeviceModel::S3);
    ///     let update = json!({"state": "on", "fan_speed": 3});
    ///     breezer.set(update.as_object().unwrap(), false).await.unwrap();
    ///     assert_eq!(breezer.transport().state().fan_speed, 3);
    /// }
    /// ```
    #[tracing::instrument(level = "info", skip(self, update), fields(address = %self.address, keys = update.len()))]
    pub async fn set(&mut self, update: &Map<String, Value>, need_update: bool) -> Result<Vec<Bytes>> {
        // reject bad updates before any I/O
        self.state.clone().apply_partial(update)?;

        let need_update = need_update || !self.state.has_valid_state;
        let result = self.write_update(update, need_update).await;
        match &result {
            Ok(_) => self.close().await,
            Err(_) => self.abort().await,
        }
        result
    }

    /// Pair with the breezer.
    ///
    /// S3 breezers get a pair command. Lite bonding happens in the BLE stack,
    /// so for Lite this only connects and disconnects.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    pub async fn pair(&mut self) -> Result<()> {
        let result = self.write_pair().await;
        match &result {
            Ok(()) => self.close().await,
            Err(_) => self.abort().await,
        }
        result
    }

    async fn write_pair(&mut self) -> Result<()> {
        self.open().await?;
        match self.protocol.encode_pair() {
            Some(command) => {
                let packets = self.protocol.packetize(&command.bytes);
                self.write_packets(&packets).await
            }
            None => {
                info!("{} pairs through the BLE stack", self.protocol.model());
                Ok(())
            }
        }
    }

    async fn write_update(&mut self, update: &Map<String, Value>, need_update: bool) -> Result<Vec<Bytes>> {
        if need_update {
            self.get(true).await?;
        }
        if !self.state.has_valid_state {
            return Err(Error::NoState);
        }

        let mut next = self.state.clone();
        next.apply_partial(update)?;
        let command = self.protocol.encode_set(&next, &mut *self.rng);
        debug!("Set command: {}", command.hex());
        let packets = self.protocol.packetize(&command.bytes);

        self.open().await?;
        self.write_packets(&packets).await?;
        self.state = next;
        Ok(packets)
    }

    /// Send `request` and decode the answer on top of the cached state.
    async fn exchange(&mut self, request: Command, keep_connection: bool) -> Result<DeviceState> {
        let result = self.exchange_inner(&request).await;
        self.last_request = Some(request);
        match &result {
            Ok(_) if keep_connection => {}
            Ok(_) => self.close().await,
            Err(_) => self.abort().await,
        }
        result
    }

    async fn exchange_inner(&mut self, request: &Command) -> Result<DeviceState> {
        self.open().await?;
        let packets = self.protocol.packetize(&request.bytes);
        self.write_packets(&packets).await?;

        let frame = self.await_frame().await?;
        match self.protocol.decode_frame(&frame, request, &self.state) {
            Ok(state) => {
                self.set_phase(SessionPhase::Decoded);
                Ok(state)
            }
            Err(e) => {
                warn!("Could not decode {} answer: {}", request.kind, e);
                Err(e.into())
            }
        }
    }

    /// Connect with backoff, then subscribe to notifications.
    async fn open(&mut self) -> Result<()> {
        if !self.transport.is_connected().await {
            self.set_phase(SessionPhase::Connecting);
            let retry = &self.config.connect_retry;
            let mut attempt = 0;
            loop {
                match self.transport.connect(&self.address).await {
                    Ok(()) => break,
                    Err(e) if !e.is_retryable() || attempt >= retry.max_retries => return Err(e),
                    Err(e) => {
                        let delay = retry.delay_for_attempt(attempt);
                        warn!(
                            "Connect failed (attempt {}/{}): {}, retrying in {:?}",
                            attempt + 1,
                            retry.max_retries + 1,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
            info!("Connected to {}", self.address);
        }

        if self.config.enable_notifications {
            let notify = self.protocol.notify_characteristic();
            self.transport.enable_notifications(notify).await?;
        }
        Ok(())
    }

    /// Write `packets` in order.
    ///
    /// A write on a stale handle reconnects once and starts the sequence over.
    async fn write_packets(&mut self, packets: &[Bytes]) -> Result<()> {
        self.set_phase(SessionPhase::Writing);
        let characteristic = self.protocol.write_characteristic();
        let mut reconnected = false;
        let mut i = 0;
        while let Some(packet) = packets.get(i) {
            debug!("Writing packet {}/{}: {}", i + 1, packets.len(), hex(packet));
            match self.transport.write(characteristic, packet).await {
                Ok(()) => i += 1,
                Err(Error::NotConnected) if !reconnected => {
                    warn!("Connection handle went stale, reconnecting");
                    reconnected = true;
                    if let Err(e) = self.transport.disconnect().await {
                        debug!("Disconnect of stale handle failed: {}", e);
                    }
                    self.open().await?;
                    self.set_phase(SessionPhase::Writing);
                    i = 0;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Collect one complete frame from notifications, falling back to a read.
    async fn await_frame(&mut self) -> Result<Bytes> {
        self.set_phase(SessionPhase::AwaitingNotifications);
        let mut reader = self.protocol.new_frame_reader();
        let attempts = self.config.poll_attempts;
        let interval = self.config.poll_interval;

        for attempt in 1..=attempts {
            match self.transport.wait_for_notification(interval).await? {
                Some(packet) => {
                    debug!("Notification {}/{}: {}", attempt, attempts, hex(&packet));
                    self.set_phase(SessionPhase::Reassembling);
                    if let Err(e) = reader.feed(&packet) {
                        warn!("Dropping packet: {}", e);
                    }
                    if let Some(frame) = reader.take_frame() {
                        return Ok(frame);
                    }
                }
                None => debug!("No notification ({}/{})", attempt, attempts),
            }
        }

        debug!("Notifications exhausted, reading the notify characteristic");
        let notify = self.protocol.notify_characteristic();
        let data = self.transport.read(notify).await?;
        if !data.is_empty() {
            if let Err(e) = reader.feed(&data) {
                warn!("Dropping read value: {}", e);
            }
            if let Some(frame) = reader.take_frame() {
                return Ok(frame);
            }
        }

        self.set_phase(SessionPhase::TimedOut);
        Err(Error::timeout(
            "wait for notification",
            interval.saturating_mul(attempts),
        ))
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
        self.set_phase(SessionPhase::Disconnected);
    }

    /// Disconnect after a failure, keeping the failure phase visible.
    async fn abort(&mut self) {
        if self.phase != SessionPhase::TimedOut {
            self.set_phase(SessionPhase::Failed);
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect after failure failed: {}", e);
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!("Session phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
