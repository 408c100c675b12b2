//! Device state synchronization
//!
//! The [`Adapter`] owns one driver session at a time, turns device events
//! into surface updates and surface commands into driver primitives, and
//! rebuilds the session when the link configuration changes.
//!
//! All handlers take `&mut self` and return without waiting on the device;
//! outcomes come back later as device events. A convenience switch whose
//! outcome is not known right away is awaited on a task of the current Tokio
//! runtime; without a runtime it is reported as failed.

use crate::config::{ConfigStore, Configuration};
use crate::driver::{DeviceEvent, DriverFactory, EventSink, SessionEvent, SessionId, StartOptions};
use crate::error::Result;
use crate::session::{project_source_status, project_volume, snapshot_source, Session};
use crate::settings::{make_layout, SettingsLayout, SettingsOutcome};
use crate::status::StatusSink;
use crate::surface::{Request, SurfaceCommand, SurfaceHost, SurfaceId};
use crate::types::{
    CompleteStatus, DeviceSource, LinkState, MuteAction, SourceState, SourceStatus, SourceUpdate,
    VolumeMode, VolumeState, VolumeUpdate, VolumeValue, FALLBACK_VOLUME, VOLUME_MAX, VOLUME_MIN,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Status shown while no connection target is set
pub const NOT_CONFIGURED: &str = "Not configured, please check settings.";

/// External collaborators the adapter talks to
#[derive(Clone)]
pub struct Services {
    pub drivers: Arc<dyn DriverFactory>,
    pub surfaces: Arc<dyn SurfaceHost>,
    pub status: Arc<dyn StatusSink>,
    pub store: Arc<dyn ConfigStore>,
}

/// Keeps the volume and source/power surfaces in sync with the amplifier
pub struct Adapter {
    config: Configuration,
    services: Services,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    session: Option<Session>,
}

impl Adapter {
    /// Create an adapter for `config` without starting a session
    pub fn new(services: Services, config: Configuration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            services,
            events_tx,
            events_rx: Some(events_rx),
            session: None,
        }
    }

    /// Create an adapter from the stored configuration, or defaults
    ///
    /// A stored record that fails validation is not applied: the adapter
    /// starts unconfigured until valid settings are saved.
    pub fn from_store(services: Services) -> Result<Self> {
        let mut config = services.store.load_or_default()?;
        if let Err(e) = config.validate() {
            tracing::warn!("Ignoring stored configuration: {}", e);
            config = Configuration::default();
        }
        Ok(Self::new(services, config))
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn link_state(&self) -> LinkState {
        self.session
            .as_ref()
            .map_or(LinkState::TornDown, |session| session.link)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    /// What the volume surface currently shows, if it is published
    pub fn volume_state(&self) -> Option<VolumeState> {
        self.session.as_ref()?.volume_state().cloned()
    }

    pub fn source_state(&self) -> Option<SourceState> {
        self.session.as_ref()?.source_state().cloned()
    }

    pub fn volume_surface_id(&self) -> Option<SurfaceId> {
        self.session.as_ref()?.volume_id()
    }

    pub fn source_surface_id(&self) -> Option<SurfaceId> {
        self.session.as_ref()?.source_id()
    }

    /// Hand the device event stream to an external loop
    ///
    /// After this, events are only processed through [`Adapter::dispatch`].
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Start a session for the current configuration
    pub fn start(&mut self) {
        self.start_session(self.config.clone());
    }

    // ========== Session lifecycle ==========

    /// Build a driver for `config` and start it if a target is configured
    ///
    /// Any running session is stopped first.
    pub fn start_session(&mut self, config: Configuration) {
        self.stop_session();
        self.config = config;

        let id = Uuid::new_v4();
        let dialect = self.config.protocol_dialect;
        let sink = EventSink::new(id, self.events_tx.clone());
        let driver = self.services.drivers.create(dialect, sink);
        let mut session = Session::new(id, driver);

        tracing::info!("Starting session {} ({})", id, dialect);

        if self.config.is_configured() {
            let target = &self.config.connection_target;
            self.services.status.set_status(
                &format!("Connecting to {} on \"{}\"", dialect.link_label(), target),
                false,
            );

            let options = StartOptions {
                volume: self.config.initial_volume,
                source: self.config.convenience_source.clone(),
            };
            if let Err(e) = session.driver.start(target, options) {
                tracing::warn!("Failed to start driver on {}: {}", target, e);
                session.link = LinkState::Disconnected;
                self.services.status.set_status(&self.disconnected_message(), true);
            }
        } else {
            session.link = LinkState::Unconfigured;
            self.services.status.set_status(NOT_CONFIGURED, true);
        }

        self.session = Some(session);
    }

    /// Stop the driver and unpublish both surfaces; no-op without a session
    pub fn stop_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        tracing::info!("Stopping session {}", session.id);

        if session.has_surfaces() {
            let dialect = self.config.protocol_dialect;
            self.services.status.set_status(
                &format!(
                    "Closing connection to {} on \"{}\"",
                    dialect.link_label(),
                    self.config.connection_target
                ),
                false,
            );
        }

        session.driver.stop();
        session.destroy_surfaces();
    }

    /// Apply a new configuration
    ///
    /// The session is rebuilt only when the target or dialect changed; other
    /// fields take effect on the next device event or command.
    pub fn reconfigure(&mut self, config: Configuration) -> Result<()> {
        config.validate()?;

        if self.session.is_some() && self.config.same_link(&config) {
            tracing::info!("Configuration updated, keeping current link");
            self.config = config;
        } else {
            tracing::info!(
                "Link changed to {} ({}), restarting session",
                config.connection_target,
                config.protocol_dialect
            );
            self.start_session(config);
        }
        Ok(())
    }

    // ========== Device events ==========

    /// Route a tagged event to the current session, dropping stale ones
    pub fn dispatch(&mut self, event: SessionEvent) {
        if self.session_id() == Some(event.session) {
            self.handle_device_event(event.event);
        } else {
            tracing::debug!(
                "Dropping {:?} from finished session {}",
                event.event,
                event.session
            );
        }
    }

    /// Process every event already queued by the driver
    ///
    /// Returns the number of events handled. Does nothing once the receiver
    /// was taken with [`Adapter::take_event_receiver`].
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(event) = self.events_rx.as_mut().and_then(|rx| rx.try_recv().ok()) else {
                return handled;
            };
            self.dispatch(event);
            handled += 1;
        }
    }

    /// Handle an event from the current session's driver
    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected => self.on_connected(),
            DeviceEvent::Disconnected => self.on_disconnected(),
            DeviceEvent::Volume(volume) => {
                tracing::debug!("Received volume change from device: {}", volume);
                if let Some(session) = self.session.as_mut() {
                    session.update_volume(VolumeUpdate::volume(volume));
                }
            }
            DeviceEvent::Source(raw) => self.on_source(&raw),
        }
    }

    fn on_connected(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let dialect = self.config.protocol_dialect;

        tracing::info!("Connected to {}", self.config.connection_target);
        session.link = LinkState::Connected;
        self.services
            .status
            .set_status(&format!("Connected to {}", dialect.link_label()), false);

        // the device's own boot state is not trusted
        if let Err(e) = session.driver.set_volume(self.config.initial_volume) {
            tracing::warn!("Failed to set initial volume: {}", e);
        }
        // confirmation arrives as a source event
        let _ = session.driver.set_source(&self.config.convenience_source);

        let snapshot = session.driver.properties();
        let source = snapshot_source(&snapshot, dialect);
        let volume_state = project_volume(snapshot.volume, source.as_ref());
        let source_state = SourceState::new(project_source_status(
            source.as_ref(),
            self.config.presence_source(),
        ));

        let volume_surface = self.services.surfaces.new_volume_device(volume_state.clone());
        let source_surface = self.services.surfaces.new_source_device(source_state.clone());
        session.publish((volume_surface, volume_state), (source_surface, source_state));
    }

    fn on_disconnected(&mut self) {
        let message = self.disconnected_message();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        tracing::info!("Disconnected from {}", self.config.connection_target);
        session.link = LinkState::Disconnected;
        self.services.status.set_status(&message, true);
        session.destroy_surfaces();
    }

    fn on_source(&mut self, raw: &str) {
        tracing::debug!("Received source change from device: {}", raw);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match self.config.protocol_dialect.classify(raw) {
            DeviceSource::Muted => session.update_volume(VolumeUpdate::muted(true)),
            DeviceSource::Standby => {
                session.update_source(SourceUpdate::status(SourceStatus::Standby))
            }
            source @ DeviceSource::Source(_) => {
                let status = project_source_status(Some(&source), self.config.presence_source());
                session.update_volume(VolumeUpdate::muted(false));
                session.update_source(SourceUpdate::status(status));
            }
        }
    }

    fn disconnected_message(&self) -> String {
        format!(
            "Could not connect to {} on \"{}\"",
            self.config.protocol_dialect.link_label(),
            self.config.connection_target
        )
    }

    // ========== Surface commands ==========

    /// Execute a command issued by one of the published surfaces
    pub fn handle_command(&mut self, command: SurfaceCommand) {
        let live = self.session.as_ref().and_then(|session| match &command {
            SurfaceCommand::SetVolume { .. } | SurfaceCommand::SetMute { .. } => session.volume_id(),
            SurfaceCommand::ConvenienceSwitch { .. } | SurfaceCommand::Standby { .. } => {
                session.source_id()
            }
        });

        if live != Some(command.surface()) {
            tracing::warn!(
                "Ignoring command for surface {} that is no longer published",
                command.surface()
            );
            command.request().send_complete(CompleteStatus::Success);
            if let SurfaceCommand::ConvenienceSwitch { request, .. } = &command {
                // accepted, but the source was never changed
                request.send_complete(CompleteStatus::Failed);
            }
            return;
        }

        match command {
            SurfaceCommand::SetVolume {
                request,
                mode,
                value,
                ..
            } => self.set_volume(&request, mode, value),
            SurfaceCommand::SetMute { request, action, .. } => self.set_mute(&request, action),
            SurfaceCommand::ConvenienceSwitch { request, .. } => self.convenience_switch(&request),
            SurfaceCommand::Standby { request, .. } => self.standby(&request),
        }
    }

    fn set_volume(&mut self, request: &Request, mode: VolumeMode, value: VolumeValue) {
        if let Some(session) = self.session.as_mut() {
            let target = match mode {
                VolumeMode::Absolute => value,
                VolumeMode::Relative => {
                    let current = session
                        .driver
                        .properties()
                        .volume
                        .or_else(|| session.volume_state().map(|s| s.volume_value))
                        .unwrap_or(FALLBACK_VOLUME);
                    current.saturating_add(value)
                }
            };
            let clamped = match session.volume_state() {
                Some(state) => state.clamp(target),
                None => target.clamp(VOLUME_MIN, VOLUME_MAX),
            };

            tracing::debug!("Setting volume to {} ({:?} {})", clamped, mode, value);
            if let Err(e) = session.driver.set_volume(clamped) {
                tracing::warn!("Failed to set volume: {}", e);
            }
        }
        request.send_complete(CompleteStatus::Success);
    }

    fn set_mute(&mut self, request: &Request, action: MuteAction) {
        if let Some(session) = self.session.as_mut() {
            let dialect = self.config.protocol_dialect;
            let unmute = match action {
                MuteAction::On => false,
                MuteAction::Off => true,
                MuteAction::Toggle => matches!(
                    snapshot_source(&session.driver.properties(), dialect),
                    Some(DeviceSource::Muted)
                ),
            };

            if unmute {
                tracing::debug!("Unmuting by selecting {}", self.config.convenience_source);
                let _ = session.driver.set_source(&self.config.convenience_source);
            } else {
                tracing::debug!("Muting");
                if let Err(e) = session.driver.mute() {
                    tracing::warn!("Failed to mute: {}", e);
                }
            }
        }
        request.send_complete(CompleteStatus::Success);
    }

    fn convenience_switch(&mut self, request: &Request) {
        let Some(session) = self.session.as_mut() else {
            request.send_complete(CompleteStatus::Success);
            return;
        };

        tracing::debug!("Convenience switch to {}", self.config.convenience_source);
        let mut completion = session.driver.set_source(&self.config.convenience_source);
        request.send_complete(CompleteStatus::Success);

        if let Some(result) = completion.try_outcome() {
            request.send_complete(outcome_status(result));
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let request = request.clone();
                runtime.spawn(async move {
                    request.send_complete(outcome_status(completion.wait().await));
                });
            }
            Err(_) => {
                tracing::warn!("No runtime to wait for the source change on, reporting failure");
                request.send_complete(CompleteStatus::Failed);
            }
        }
    }

    fn standby(&mut self, request: &Request) {
        if let Some(session) = self.session.as_mut() {
            tracing::debug!("Entering standby");
            // shown right away; a later source event may overwrite it
            session.update_source(SourceUpdate::status(SourceStatus::Standby));
            if let Err(e) = session.driver.standby() {
                tracing::warn!("Failed to enter standby: {}", e);
            }
        }
        request.send_complete(CompleteStatus::Success);
    }

    // ========== Settings ==========

    /// Settings form for the current configuration
    pub fn get_settings(&self) -> SettingsLayout {
        make_layout(&self.config)
    }

    /// Validate `candidate` and, unless this is a dry run, persist and apply it
    ///
    /// Invalid candidates are reported as `NotValid` and change nothing. If
    /// persisting fails, the configuration is not applied.
    pub fn save_settings(
        &mut self,
        candidate: Configuration,
        dry_run: bool,
    ) -> Result<SettingsOutcome> {
        let settings = make_layout(&candidate);
        if settings.has_error {
            return Ok(SettingsOutcome {
                status: CompleteStatus::NotValid,
                settings,
            });
        }

        if !dry_run {
            self.services.store.save(&candidate)?;
            self.reconfigure(candidate)?;
        }

        Ok(SettingsOutcome {
            status: CompleteStatus::Success,
            settings,
        })
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.stop_session();
    }
}

fn outcome_status(result: Result<()>) -> CompleteStatus {
    match result {
        Ok(()) => CompleteStatus::Success,
        Err(e) => {
            tracing::warn!("Source change failed: {}", e);
            CompleteStatus::Failed
        }
    }
}
