//! Control surface capability interfaces
//!
//! A surface is a published, externally commandable view of one facet of the
//! amplifier. The host creates and renders surfaces; commands coming back
//! from them reach the bridge as [`SurfaceCommand`] values.

use crate::error::{BridgeError, Result};
use crate::types::{
    CompleteStatus, MuteAction, SourceState, SourceUpdate, VolumeMode, VolumeState, VolumeUpdate,
    VolumeValue,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one published surface instance
pub type SurfaceId = Uuid;

/// Published volume control
pub trait VolumeSurface: Send {
    fn id(&self) -> SurfaceId;

    fn update(&mut self, update: &VolumeUpdate);

    /// Unpublish the surface
    fn destroy(self: Box<Self>);
}

/// Published source/power control
pub trait SourceSurface: Send {
    fn id(&self) -> SurfaceId;

    fn update(&mut self, update: &SourceUpdate);

    fn destroy(self: Box<Self>);
}

/// Host platform service that publishes surfaces
pub trait SurfaceHost: Send + Sync {
    fn new_volume_device(&self, state: VolumeState) -> Box<dyn VolumeSurface>;

    fn new_source_device(&self, state: SourceState) -> Box<dyn SourceSurface>;
}

/// Completion channel attached to a surface command
///
/// A request may be completed more than once: the convenience switch first
/// reports acceptance and later the outcome of the device command.
#[derive(Debug, Clone)]
pub struct Request {
    tx: mpsc::UnboundedSender<CompleteStatus>,
}

impl Request {
    pub fn new() -> (Self, CompletionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CompletionReceiver { rx })
    }

    pub fn send_complete(&self, status: CompleteStatus) {
        if self.tx.send(status).is_err() {
            tracing::debug!("Completion {:?} dropped, caller went away", status);
        }
    }
}

/// Caller side of a [`Request`]
pub struct CompletionReceiver {
    rx: mpsc::UnboundedReceiver<CompleteStatus>,
}

impl CompletionReceiver {
    /// Receive the next completion
    ///
    /// Returns `ConnectionClosed` once every copy of the request is gone.
    pub async fn recv(&mut self) -> Result<CompleteStatus> {
        self.rx.recv().await.ok_or(BridgeError::ConnectionClosed)
    }

    /// Try to receive a completion without blocking
    ///
    /// Returns `None` if no completion is available yet.
    pub fn try_recv(&mut self) -> Result<Option<CompleteStatus>> {
        match self.rx.try_recv() {
            Ok(status) => Ok(Some(status)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BridgeError::ConnectionClosed),
        }
    }
}

/// Command issued by a published surface
#[derive(Debug, Clone)]
pub enum SurfaceCommand {
    SetVolume {
        surface: SurfaceId,
        request: Request,
        mode: VolumeMode,
        value: VolumeValue,
    },
    SetMute {
        surface: SurfaceId,
        request: Request,
        action: MuteAction,
    },
    ConvenienceSwitch {
        surface: SurfaceId,
        request: Request,
    },
    Standby {
        surface: SurfaceId,
        request: Request,
    },
}

impl SurfaceCommand {
    /// Surface the command was issued on
    pub fn surface(&self) -> SurfaceId {
        match self {
            SurfaceCommand::SetVolume { surface, .. }
            | SurfaceCommand::SetMute { surface, .. }
            | SurfaceCommand::ConvenienceSwitch { surface, .. }
            | SurfaceCommand::Standby { surface, .. } => *surface,
        }
    }

    pub fn request(&self) -> &Request {
        match self {
            SurfaceCommand::SetVolume { request, .. }
            | SurfaceCommand::SetMute { request, .. }
            | SurfaceCommand::ConvenienceSwitch { request, .. }
            | SurfaceCommand::Standby { request, .. } => request,
        }
    }
}
