//! Session/link manager
//!
//! Drives one kettle from a bare link to an authenticated session:
//!
//! ```text
//! Disconnected -> Connecting -> ServiceValidating -> Subscribing -> LoggingIn -> Authenticated
//! ```
//!
//! and owns everything that needs the authenticated channel: status reads,
//! the boil cutoff, actions and setpoint changes. Commands must be
//! serialized by the caller; [`KettleDevice`](crate::device::KettleDevice)
//! does that with a mutex.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kettle_core::{
    is_supported_model, parse_status, read_segment, replace_segment, AuthContext, Backoff,
    DeviceToken, KettleAction, KettleConfig, KettleError, ModeSegment, Result, SafetyMonitor,
    SafetyVerdict, SetpointKind, SetpointSource, StatusSnapshot, HEAT_INDEX,
    NOTIFY_CHARACTERISTICS, READ_MODE_CONFIG_UUID, REQUIRED_CHARACTERISTICS, REQUIRED_SERVICES,
    WARM_INDEX, WARM_SETTING_PRIMARY_UUID, WARM_STATUS_UUID, WRITE_MODE_CONFIG_UUID,
};

use crate::handshake::{Handshake, LoginOutcome};
use crate::link::{FrameHandler, KettleLink};
use crate::mailbox::Mailbox;
use crate::observer::{AvailabilityEvent, Observers};
use crate::writer::FrameWriter;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Where the session is in its connect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    ServiceValidating,
    Subscribing,
    LoggingIn,
    Authenticated,
}

/// State shared with the transport's callback paths
///
/// The login secrets live here so a transport-reported disconnect can wipe
/// them without waiting for the session mutex.
pub struct SessionShared {
    session_id: String,
    mailbox: Mailbox,
    linked: AtomicBool,
    authenticated: AtomicBool,
    state: Mutex<LinkState>,
    auth: Mutex<Option<AuthContext>>,
    last_status: Mutex<Option<StatusSnapshot>>,
    /// Last control-capable value published; `None` until a status after login
    control: Mutex<Option<bool>>,
    observers: Observers,
}

impl SessionShared {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            mailbox: Mailbox::new(),
            linked: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            state: Mutex::new(LinkState::Disconnected),
            auth: Mutex::new(None),
            last_status: Mutex::new(None),
            control: Mutex::new(None),
            observers: Observers::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    fn set_state(&self, state: LinkState) {
        *lock(&self.state) = state;
    }

    /// Whether secrets from an exchanged login are held
    pub fn has_auth_context(&self) -> bool {
        lock(&self.auth).is_some()
    }

    /// Whether the held login derived session keys
    pub fn has_session_keys(&self) -> bool {
        lock(&self.auth).as_ref().is_some_and(|auth| auth.keys().is_some())
    }

    /// Last status dispatched to observers; kept across reconnects
    pub fn last_status(&self) -> Option<StatusSnapshot> {
        lock(&self.last_status).clone()
    }

    /// Route a notification: status frames replace the cache, the rest queue
    pub fn deliver(&self, characteristic: Uuid, frame: Vec<u8>) {
        if characteristic == WARM_STATUS_UUID {
            self.mailbox.store_latest(characteristic, frame);
        } else {
            self.mailbox.push(characteristic, frame);
        }
    }

    fn authenticate(&self, auth: Option<AuthContext>) {
        *lock(&self.auth) = auth;
        *lock(&self.control) = None;
        self.authenticated.store(true, Ordering::SeqCst);
        self.set_state(LinkState::Authenticated);
    }

    /// Drop session state after the link went away
    ///
    /// Wipes the login secrets and fires one availability event per lost
    /// link, however the loss was reported.
    pub fn handle_disconnect(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
        *lock(&self.auth) = None;
        *lock(&self.control) = None;
        self.set_state(LinkState::Disconnected);
        self.mailbox.clear();
        if self.linked.swap(false, Ordering::SeqCst) {
            info!(session = %self.session_id, "Kettle session disconnected");
            self.publish_availability(false, Some(false));
        }
    }

    /// Cache a dispatched status and publish control capability changes
    fn record_status(&self, snapshot: &StatusSnapshot) {
        *lock(&self.last_status) = Some(snapshot.clone());
        let previous = lock(&self.control).replace(snapshot.is_control);
        if previous != Some(snapshot.is_control) && self.linked.load(Ordering::SeqCst) {
            self.publish_availability(true, Some(snapshot.is_control));
        }
    }

    fn publish_availability(&self, available: bool, control_capable: Option<bool>) {
        let event = AvailabilityEvent {
            session_id: self.session_id.clone(),
            available,
            authenticated: self.is_authenticated(),
            control_capable,
        };
        debug!(session = %self.session_id, ?event, "Publishing availability");
        self.observers.notify_availability(&event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Authenticated control session with one kettle
pub struct KettleSession<L> {
    link: Arc<L>,
    shared: Arc<SessionShared>,
    config: KettleConfig,
    psk: DeviceToken,
    setpoints: Arc<dyn SetpointSource>,
    safety: SafetyMonitor,
    backoff: Backoff,
}

impl<L: KettleLink + 'static> KettleSession<L> {
    /// Create a session over `link`, validating the configuration
    pub fn new(link: L, config: KettleConfig) -> Result<Self> {
        config.validate()?;
        let psk = config.device_token()?;
        let setpoints: Arc<dyn SetpointSource> = Arc::new(config.shared_setpoints());
        let backoff = Backoff::new(kettle_core::backoff::INITIAL_BACKOFF, config.max_backoff());

        let session = Self {
            link: Arc::new(link),
            shared: Arc::new(SessionShared::new("kettle".to_string())),
            config,
            psk,
            setpoints,
            safety: SafetyMonitor::new(),
            backoff,
        };
        session.install_disconnect_handler();
        Ok(session)
    }

    /// Identify this session in availability events and logs
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.shared = Arc::new(SessionShared::new(session_id.into()));
        self.install_disconnect_handler();
        self
    }

    /// Use a host-owned setpoint source instead of the configured values
    pub fn with_setpoints(mut self, setpoints: Arc<dyn SetpointSource>) -> Self {
        self.setpoints = setpoints;
        self
    }

    fn install_disconnect_handler(&self) {
        let shared = self.shared.clone();
        self.link
            .set_disconnect_handler(Arc::new(move || shared.handle_disconnect()));
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn config(&self) -> &KettleConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.is_authenticated()
    }

    /// Whether secrets are held; false when the device skipped the exchange
    pub fn has_auth_context(&self) -> bool {
        self.shared.has_auth_context()
    }

    pub fn has_session_keys(&self) -> bool {
        self.shared.has_session_keys()
    }

    pub fn last_status(&self) -> Option<StatusSnapshot> {
        self.shared.last_status()
    }

    pub async fn is_connected(&self) -> bool {
        self.link.is_connected().await
    }

    // ---- Connect ----

    /// Connect, validate, subscribe and log in
    ///
    /// Any failure tears the link down again before the error is returned.
    pub async fn connect(&mut self) -> Result<()> {
        let result = self.establish().await;
        if let Err(e) = &result {
            error!(session = %self.shared.session_id, "Failed to connect to kettle: {}", e);
            self.disconnect().await;
        }
        result
    }

    async fn establish(&mut self) -> Result<()> {
        self.shared.set_state(LinkState::Connecting);
        self.link.connect().await?;
        self.shared.linked.store(true, Ordering::SeqCst);
        self.check_model().await?;

        self.shared.set_state(LinkState::ServiceValidating);
        self.validate_services().await?;

        self.shared.set_state(LinkState::Subscribing);
        self.subscribe().await?;

        self.shared.set_state(LinkState::LoggingIn);
        self.login().await
    }

    async fn check_model(&self) -> Result<()> {
        match self.link.local_name().await? {
            Some(name) if !is_supported_model(&name) => {
                Err(KettleError::UnsupportedModel { name })
            }
            Some(name) => {
                debug!(model = %name, "Supported kettle model");
                Ok(())
            }
            None => {
                warn!("Kettle did not report a model name, continuing");
                Ok(())
            }
        }
    }

    async fn validate_services(&self) -> Result<()> {
        let services = self.link.services().await?;
        for service in REQUIRED_SERVICES {
            if !services.iter().any(|s| s.uuid == service) {
                return Err(KettleError::ServiceNotFound { service });
            }
        }

        let available: HashSet<Uuid> = services
            .iter()
            .filter(|s| REQUIRED_SERVICES.contains(&s.uuid))
            .flat_map(|s| s.characteristics.iter().copied())
            .collect();
        for characteristic in REQUIRED_CHARACTERISTICS {
            if !available.contains(&characteristic) {
                return Err(KettleError::CharacteristicNotFound { characteristic });
            }
        }
        debug!("Kettle GATT profile validated");
        Ok(())
    }

    async fn subscribe(&self) -> Result<()> {
        for characteristic in NOTIFY_CHARACTERISTICS {
            let shared = self.shared.clone();
            let handler: FrameHandler = Arc::new(move |uuid, frame| shared.deliver(uuid, frame));
            self.link.subscribe(characteristic, handler).await?;
        }
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        let mut auth = AuthContext::new(self.psk.clone());
        let outcome = {
            let writer = FrameWriter::new(self.link.as_ref(), &self.shared.mailbox);
            Handshake::new(writer, &mut auth).run().await?
        };
        self.shared.authenticate((outcome == LoginOutcome::Exchanged).then_some(auth));
        self.safety.reset();
        info!(session = %self.shared.session_id, "Kettle login success");

        if let Err(e) = self.sync_profile().await {
            warn!("Failed to sync kettle profile: {}", e);
        }
        self.shared.publish_availability(true, None);
        Ok(())
    }

    /// Write the caller's heat and warm setpoints into the mode record
    pub async fn sync_profile(&mut self) -> Result<()> {
        let setpoints = self.setpoints.setpoints();
        let record = self.read_mode_config().await?;
        let record = replace_segment(
            &record,
            WARM_INDEX,
            &SetpointKind::Warm.segment(setpoints.warm),
        )?;
        let record = replace_segment(
            &record,
            HEAT_INDEX,
            &SetpointKind::Heat.segment(setpoints.heat),
        )?;
        self.writer().write(WRITE_MODE_CONFIG_UUID, &record, None, true).await?;
        info!(heat = setpoints.heat, warm = setpoints.warm, "Kettle profile synced");
        Ok(())
    }

    /// Close the link and drop all session state
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.link.disconnect().await {
            warn!("Failed to close kettle link: {}", e);
        }
        self.shared.handle_disconnect();
    }

    // ---- Status ----

    /// Parse the latest cached status frame and dispatch it to observers
    ///
    /// Waits afterwards for the next status notification, which keeps the
    /// device link active. The wait happens even when no usable frame was
    /// cached, so a bad frame does not shorten the poll cadence.
    pub async fn read_status(&mut self) -> Result<StatusSnapshot> {
        let status = self.cached_status();
        if let Ok(snapshot) = &status {
            self.shared.observers.notify_status(snapshot);
            self.shared.record_status(snapshot);
            debug!(
                action = %snapshot.action,
                mode = snapshot.mode,
                temperature = snapshot.current_temperature,
                "Kettle status"
            );
        }

        if !self
            .shared
            .mailbox
            .wait_for_signal(WARM_STATUS_UUID, self.config.notification_timeout())
            .await
        {
            warn!("Timed out waiting for a status notification");
        }
        status
    }

    fn cached_status(&self) -> Result<StatusSnapshot> {
        let frame = self
            .shared
            .mailbox
            .latest(WARM_STATUS_UUID)
            .ok_or(KettleError::StatusUnavailable)?;
        Ok(parse_status(&frame, self.is_authenticated())?)
    }

    /// Stop heating once the heat target is reached
    ///
    /// Returns true when a stop command was issued on this call.
    pub async fn heat_safe_check(&mut self) -> Result<bool> {
        let Some(status) = self.shared.last_status() else {
            return Ok(false);
        };
        if !self.safety.watches(status.mode) {
            return Ok(false);
        }

        let target = self.read_mode_segment(HEAT_INDEX).await?.temperature;
        let verdict = self
            .safety
            .evaluate(status.mode, status.current_temperature, target);
        if verdict != SafetyVerdict::Stop {
            return Ok(false);
        }

        info!(
            current = status.current_temperature,
            target, "Heat target reached, turning off heat"
        );
        if let Err(e) = self.action(KettleAction::TurnOffHeat).await {
            self.safety.reset();
            return Err(e);
        }
        Ok(true)
    }

    // ---- Commands ----

    pub async fn action(&mut self, action: KettleAction) -> Result<()> {
        self.require_login()?;
        let status = self.cached_status()?;

        let Some(payload) = action.payload(status.warm_after_boil_raw, status.mode) else {
            error!(
                mode = status.mode,
                "Failed to {}, mode not in 0..=4", action
            );
            return Ok(());
        };
        self.writer()
            .write(WARM_SETTING_PRIMARY_UUID, &payload, None, true)
            .await?;
        info!(%action, "Kettle action sent");
        Ok(())
    }

    /// Dispatch an action by its host-facing name
    pub async fn action_by_name(&mut self, name: &str) -> Result<()> {
        self.action(name.parse()?).await
    }

    /// Change one setpoint on the device and in the setpoint source
    pub async fn set_setpoint(&mut self, kind: SetpointKind, value: i64) -> Result<()> {
        let temperature = kind.validate(value)?;
        self.require_login()?;

        let record = self.read_mode_config().await?;
        let record = replace_segment(&record, kind.segment_index(), &kind.segment(temperature))?;
        self.writer().write(WRITE_MODE_CONFIG_UUID, &record, None, true).await?;
        self.setpoints.store(kind, temperature);
        info!(kind = kind.as_str(), temperature, "Setpoint updated");
        Ok(())
    }

    pub async fn read_mode_segment(&self, index: usize) -> Result<ModeSegment> {
        let record = self.read_mode_config().await?;
        Ok(ModeSegment::from(read_segment(&record, index)?))
    }

    async fn read_mode_config(&self) -> Result<Vec<u8>> {
        self.require_login()?;
        let record = self.link.read(READ_MODE_CONFIG_UUID).await?;
        debug!(record = %hex::encode(&record), "Mode config read");
        Ok(record)
    }

    fn require_login(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(KettleError::NotAuthenticated)
        }
    }

    fn writer(&self) -> FrameWriter<'_, L> {
        FrameWriter::new(self.link.as_ref(), &self.shared.mailbox)
    }

    // ---- Poll Loop ----

    /// One poll tick: reconnect if needed, then status and safety check
    pub async fn tick(&mut self) -> Result<()> {
        if !self.link.is_connected().await {
            self.connect().await?;
        }
        if !self.is_authenticated() {
            return Ok(());
        }
        match self.read_status().await {
            Ok(_) => {
                self.heat_safe_check().await?;
            }
            Err(e) if e.skips_cycle() => warn!("Skipping kettle status cycle: {}", e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Delay before the next tick given the outcome of this one
    pub fn next_delay(&mut self, outcome: &Result<()>) -> Duration {
        match outcome {
            Ok(()) => {
                self.backoff.reset();
                self.config.poll_interval()
            }
            Err(_) => self.backoff.next_delay(),
        }
    }
}
