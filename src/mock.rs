//! In-memory collaborators for testing without an amplifier
//!
//! The mocks record everything the adapter does to them and let a test play
//! the part of the device.
//!
//! # Usage
//!
//! ```
//! use meridian_bridge::mock::MockEnv;
//! use meridian_bridge::{Adapter, Configuration, DeviceEvent};
//!
//! let env = MockEnv::new();
//! let config = Configuration {
//!     connection_target: "/dev/ttyUSB0".to_string(),
//!     ..Configuration::default()
//! };
//! let mut adapter = Adapter::new(env.services(), config);
//! adapter.start();
//!
//! let driver = env.drivers.latest().unwrap();
//! driver.emit(DeviceEvent::Connected).unwrap();
//! adapter.process_pending_events();
//!
//! assert!(env.surfaces.volume().is_some());
//! ```

use crate::adapter::Services;
use crate::config::MemoryStore;
use crate::dialect::Dialect;
use crate::driver::{
    Completion, CompletionSender, DeviceEvent, Driver, DriverFactory, EventSink, SessionId,
    StartOptions,
};
use crate::error::{BridgeError, Result};
use crate::status::StatusSink;
use crate::surface::{SourceSurface, SurfaceHost, SurfaceId, VolumeSurface};
use crate::types::{
    DeviceSnapshot, SourceCode, SourceState, SourceUpdate, VolumeState, VolumeUpdate, VolumeValue,
};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Side effect seen by the mock host or status sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Status { message: String, is_error: bool },
    Published(SurfaceId),
    Destroyed(SurfaceId),
}

/// Ordered log of surface and status side effects, shared between mocks
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<Observed>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, entry: Observed) {
        lock(&self.entries).push(entry);
    }

    pub fn entries(&self) -> Vec<Observed> {
        lock(&self.entries).clone()
    }

    /// Index of the first entry matching `predicate`
    pub fn position(&self, predicate: impl Fn(&Observed) -> bool) -> Option<usize> {
        lock(&self.entries).iter().position(predicate)
    }
}

/// Driver primitive recorded by [`MockDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start { target: String, options: StartOptions },
    Stop,
    SetVolume(VolumeValue),
    SetSource(SourceCode),
    Mute,
    Standby,
}

struct MockDriverState {
    dialect: Dialect,
    sink: EventSink,
    calls: Vec<DriverCall>,
    snapshot: DeviceSnapshot,
    started: bool,
    source_failure: Option<String>,
    hold_source: bool,
    held: Vec<CompletionSender>,
}

/// Test-side view of a driver created by [`MockDriverFactory`]
#[derive(Clone)]
pub struct MockDriverHandle {
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriverHandle {
    pub fn dialect(&self) -> Dialect {
        lock(&self.state).dialect
    }

    pub fn session(&self) -> SessionId {
        lock(&self.state).sink.session()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn is_started(&self) -> bool {
        lock(&self.state).started
    }

    pub fn set_snapshot(&self, snapshot: DeviceSnapshot) {
        lock(&self.state).snapshot = snapshot;
    }

    /// Play a device event: update the telemetry like a real driver, then emit
    pub fn emit(&self, event: DeviceEvent) -> Result<()> {
        let mut state = lock(&self.state);
        match &event {
            DeviceEvent::Connected => state.snapshot.connected = true,
            DeviceEvent::Disconnected => state.snapshot.connected = false,
            DeviceEvent::Volume(v) => state.snapshot.volume = Some(*v),
            DeviceEvent::Source(s) => state.snapshot.source = Some(s.clone()),
        }
        state.sink.emit(event)
    }

    /// Make every following `set_source` fail with `detail`, or succeed with `None`
    pub fn fail_source_changes(&self, detail: Option<&str>) {
        lock(&self.state).source_failure = detail.map(str::to_string);
    }

    /// Keep `set_source` completions pending until [`Self::release_source_changes`]
    pub fn hold_source_changes(&self) {
        lock(&self.state).hold_source = true;
    }

    pub fn release_source_changes(&self, result: std::result::Result<(), &str>) {
        let held = {
            let mut state = lock(&self.state);
            state.hold_source = false;
            std::mem::take(&mut state.held)
        };
        for sender in held {
            sender.complete(result.map_err(BridgeError::driver));
        }
    }
}

/// Driver that records calls instead of talking to a device
pub struct MockDriver {
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriver {
    fn record(&self, call: DriverCall) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if state.started {
            Ok(())
        } else {
            Err(BridgeError::NotStarted)
        }
    }
}

impl Driver for MockDriver {
    fn start(&mut self, target: &str, options: StartOptions) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(DriverCall::Start {
            target: target.to_string(),
            options,
        });
        state.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(DriverCall::Stop);
        state.started = false;
        state.snapshot.connected = false;
    }

    fn set_volume(&mut self, volume: VolumeValue) -> Result<()> {
        self.record(DriverCall::SetVolume(volume))
    }

    fn set_source(&mut self, source: &str) -> Completion {
        if let Err(e) = self.record(DriverCall::SetSource(source.to_string())) {
            return Completion::ready(Err(e));
        }
        let mut state = lock(&self.state);
        if state.hold_source {
            let (tx, completion) = Completion::channel();
            state.held.push(tx);
            return completion;
        }
        match &state.source_failure {
            Some(detail) => Completion::ready(Err(BridgeError::driver(detail.clone()))),
            None => Completion::ready(Ok(())),
        }
    }

    fn mute(&mut self) -> Result<()> {
        self.record(DriverCall::Mute)
    }

    fn standby(&mut self) -> Result<()> {
        self.record(DriverCall::Standby)
    }

    fn properties(&self) -> DeviceSnapshot {
        lock(&self.state).snapshot.clone()
    }
}

/// Factory producing [`MockDriver`]s and keeping a handle to each
#[derive(Clone, Default)]
pub struct MockDriverFactory {
    drivers: Arc<Mutex<Vec<MockDriverHandle>>>,
}

impl MockDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of drivers created so far
    pub fn created(&self) -> usize {
        lock(&self.drivers).len()
    }

    pub fn driver(&self, index: usize) -> Option<MockDriverHandle> {
        lock(&self.drivers).get(index).cloned()
    }

    pub fn latest(&self) -> Option<MockDriverHandle> {
        lock(&self.drivers).last().cloned()
    }
}

impl DriverFactory for MockDriverFactory {
    fn create(&self, dialect: Dialect, events: EventSink) -> Box<dyn Driver> {
        let state = Arc::new(Mutex::new(MockDriverState {
            dialect,
            sink: events,
            calls: Vec::new(),
            snapshot: DeviceSnapshot::default(),
            started: false,
            source_failure: None,
            hold_source: false,
            held: Vec::new(),
        }));
        lock(&self.drivers).push(MockDriverHandle {
            state: state.clone(),
        });
        Box::new(MockDriver { state })
    }
}

/// Surface as seen by the host
#[derive(Debug, Clone, PartialEq)]
pub struct Published<T> {
    pub id: SurfaceId,
    pub state: T,
    /// Number of partial updates received
    pub updates: usize,
    pub destroyed: bool,
}

#[derive(Default)]
struct HostState {
    volumes: Vec<Published<VolumeState>>,
    sources: Vec<Published<SourceState>>,
}

/// Surface host that keeps every published surface in memory
#[derive(Clone, Default)]
pub struct MockSurfaceHost {
    state: Arc<Mutex<HostState>>,
    journal: Journal,
}

impl MockSurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that also writes publish/destroy events to `journal`
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            state: Arc::default(),
            journal,
        }
    }

    /// State of the live volume surface
    pub fn volume(&self) -> Option<VolumeState> {
        self.live_volume().map(|p| p.state)
    }

    pub fn source(&self) -> Option<SourceState> {
        self.live_source().map(|p| p.state)
    }

    pub fn live_volume(&self) -> Option<Published<VolumeState>> {
        lock(&self.state).volumes.iter().rev().find(|p| !p.destroyed).cloned()
    }

    pub fn live_source(&self) -> Option<Published<SourceState>> {
        lock(&self.state).sources.iter().rev().find(|p| !p.destroyed).cloned()
    }

    pub fn volumes(&self) -> Vec<Published<VolumeState>> {
        lock(&self.state).volumes.clone()
    }

    pub fn sources(&self) -> Vec<Published<SourceState>> {
        lock(&self.state).sources.clone()
    }

    /// Number of surfaces of either kind that were destroyed
    pub fn destroyed(&self) -> usize {
        let state = lock(&self.state);
        state.volumes.iter().filter(|p| p.destroyed).count()
            + state.sources.iter().filter(|p| p.destroyed).count()
    }
}

impl SurfaceHost for MockSurfaceHost {
    fn new_volume_device(&self, state: VolumeState) -> Box<dyn VolumeSurface> {
        let id = Uuid::new_v4();
        lock(&self.state).volumes.push(Published {
            id,
            state,
            updates: 0,
            destroyed: false,
        });
        self.journal.record(Observed::Published(id));
        Box::new(MockVolumeSurface {
            id,
            host: self.state.clone(),
            journal: self.journal.clone(),
        })
    }

    fn new_source_device(&self, state: SourceState) -> Box<dyn SourceSurface> {
        let id = Uuid::new_v4();
        lock(&self.state).sources.push(Published {
            id,
            state,
            updates: 0,
            destroyed: false,
        });
        self.journal.record(Observed::Published(id));
        Box::new(MockSourceSurface {
            id,
            host: self.state.clone(),
            journal: self.journal.clone(),
        })
    }
}

struct MockVolumeSurface {
    id: SurfaceId,
    host: Arc<Mutex<HostState>>,
    journal: Journal,
}

impl VolumeSurface for MockVolumeSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn update(&mut self, update: &VolumeUpdate) {
        let mut host = lock(&self.host);
        if let Some(p) = host.volumes.iter_mut().find(|p| p.id == self.id) {
            p.state.apply(update);
            p.updates += 1;
        }
    }

    fn destroy(self: Box<Self>) {
        let mut host = lock(&self.host);
        if let Some(p) = host.volumes.iter_mut().find(|p| p.id == self.id) {
            p.destroyed = true;
        }
        self.journal.record(Observed::Destroyed(self.id));
    }
}

struct MockSourceSurface {
    id: SurfaceId,
    host: Arc<Mutex<HostState>>,
    journal: Journal,
}

impl SourceSurface for MockSourceSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn update(&mut self, update: &SourceUpdate) {
        let mut host = lock(&self.host);
        if let Some(p) = host.sources.iter_mut().find(|p| p.id == self.id) {
            p.state.apply(update);
            p.updates += 1;
        }
    }

    fn destroy(self: Box<Self>) {
        let mut host = lock(&self.host);
        if let Some(p) = host.sources.iter_mut().find(|p| p.id == self.id) {
            p.destroyed = true;
        }
        self.journal.record(Observed::Destroyed(self.id));
    }
}

/// Status sink that remembers every report
#[derive(Default)]
pub struct RecordingStatus {
    messages: Mutex<Vec<(String, bool)>>,
    journal: Journal,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            messages: Mutex::default(),
            journal,
        }
    }

    pub fn messages(&self) -> Vec<(String, bool)> {
        lock(&self.messages).clone()
    }

    pub fn last(&self) -> Option<(String, bool)> {
        lock(&self.messages).last().cloned()
    }
}

impl StatusSink for RecordingStatus {
    fn set_status(&self, message: &str, is_error: bool) {
        tracing::debug!("Status ({}): {}", if is_error { "error" } else { "ok" }, message);
        lock(&self.messages).push((message.to_string(), is_error));
        self.journal.record(Observed::Status {
            message: message.to_string(),
            is_error,
        });
    }
}

/// Every mock collaborator, wired together
///
/// The surface host and status sink share one [`Journal`], so tests can check
/// the order in which surfaces and status reports changed.
#[derive(Clone)]
pub struct MockEnv {
    pub drivers: MockDriverFactory,
    pub surfaces: MockSurfaceHost,
    pub status: Arc<RecordingStatus>,
    pub store: Arc<MemoryStore>,
    pub journal: Journal,
}

impl MockEnv {
    pub fn new() -> Self {
        let journal = Journal::new();
        Self {
            drivers: MockDriverFactory::new(),
            surfaces: MockSurfaceHost::with_journal(journal.clone()),
            status: Arc::new(RecordingStatus::with_journal(journal.clone())),
            store: Arc::new(MemoryStore::new()),
            journal,
        }
    }

    pub fn services(&self) -> Services {
        Services {
            drivers: Arc::new(self.drivers.clone()),
            surfaces: Arc::new(self.surfaces.clone()),
            status: self.status.clone(),
            store: self.store.clone(),
        }
    }
}

impl Default for MockEnv {
    fn default() -> Self {
        Self::new()
    }
}
