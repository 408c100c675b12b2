//! Driver capability interface
//!
//! The driver owns the physical link and the byte-level protocol. The bridge
//! only sees the primitives below plus a stream of device-originated events.

use crate::dialect::Dialect;
use crate::error::{BridgeError, Result};
use crate::types::{DeviceSnapshot, SourceCode, VolumeValue};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Identifies one driver session; events are tagged with it
pub type SessionId = Uuid;

/// Event originated by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected,
    Disconnected,
    /// Volume reported by the device
    Volume(VolumeValue),
    /// Raw code reported on the source channel, including sentinels
    Source(SourceCode),
}

/// Device event together with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: DeviceEvent,
}

/// Handed to a driver at construction; delivers its events to the bridge
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event; fails once the bridge has gone away
    pub fn emit(&self, event: DeviceEvent) -> Result<()> {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .map_err(|_| BridgeError::ConnectionClosed)
    }
}

/// Baseline the driver applies once its link comes up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub volume: VolumeValue,
    pub source: SourceCode,
}

/// Outcome of a driver command that reports completion asynchronously
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

/// Driver side of a [`Completion`]
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<Result<()>>,
}

impl CompletionSender {
    pub fn complete(self, result: Result<()>) {
        // the caller may have stopped waiting
        let _ = self.tx.send(result);
    }
}

impl Completion {
    pub fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = oneshot::channel();
        (CompletionSender { tx }, Completion { rx })
    }

    /// Completion whose outcome is already known
    pub fn ready(result: Result<()>) -> Self {
        let (tx, completion) = Self::channel();
        tx.complete(result);
        completion
    }

    /// Take the outcome if the driver already reported it
    pub fn try_outcome(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BridgeError::ConnectionClosed)),
        }
    }

    /// Wait for the driver to report the outcome
    ///
    /// A driver dropping the sender without answering counts as a closed link.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.map_err(|_| BridgeError::ConnectionClosed)?
    }
}

/// Primitive operations of a device driver
///
/// Commands are fire-and-forget: an `Err` means the command could not be
/// issued at all, while the device's response arrives later as an event.
pub trait Driver: Send {
    /// Open the link to `target`; the driver keeps reconnecting on its own
    fn start(&mut self, target: &str, options: StartOptions) -> Result<()>;

    /// Close the link; safe to call repeatedly
    fn stop(&mut self);

    fn set_volume(&mut self, volume: VolumeValue) -> Result<()>;

    fn set_source(&mut self, source: &str) -> Completion;

    fn mute(&mut self) -> Result<()>;

    fn standby(&mut self) -> Result<()>;

    /// Last telemetry reported by the device
    fn properties(&self) -> DeviceSnapshot;
}

/// Creates a driver for a dialect
pub trait DriverFactory: Send + Sync {
    fn create(&self, dialect: Dialect, events: EventSink) -> Box<dyn Driver>;
}
