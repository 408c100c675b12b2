use crate::adapter::Adapter;
use crate::config::Configuration;
use crate::error::{BridgeError, Result};
use crate::settings::{SettingsLayout, SettingsOutcome};
use crate::surface::SurfaceCommand;
use crate::types::LinkState;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

enum BridgeMessage {
    Command(SurfaceCommand),
    GetSettings(oneshot::Sender<SettingsLayout>),
    SaveSettings {
        candidate: Configuration,
        dry_run: bool,
        reply: oneshot::Sender<Result<SettingsOutcome>>,
    },
    LinkState(oneshot::Sender<LinkState>),
    Shutdown,
}

/// Runs an [`Adapter`] on its own task
///
/// The task is the only owner of the adapter: device events, surface commands
/// and settings requests are handled one at a time, in arrival order.
///
/// # Example
///
/// ```no_run
/// use meridian_bridge::mock::MockEnv;
/// use meridian_bridge::{Adapter, Bridge};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let env = MockEnv::new();
///     let adapter = Adapter::from_store(env.services())?;
///
///     let mut bridge = Bridge::spawn(adapter);
///     let settings = bridge.handle().get_settings().await?;
///     println!("{} settings fields", settings.layout.len());
///
///     bridge.stop().await;
///     Ok(())
/// }
/// ```
pub struct Bridge {
    handle: BridgeHandle,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Bridge {
    /// Start the adapter's session and its event loop
    pub fn spawn(adapter: Adapter) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task_handle = tokio::spawn(run(adapter, rx));
        Self {
            handle: BridgeHandle { tx },
            task_handle: Some(task_handle),
        }
    }

    /// Handle for sending commands and settings requests to the loop
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Stop the session and wait briefly for the loop to finish
    pub async fn stop(&mut self) {
        let _ = self.handle.tx.send(BridgeMessage::Shutdown);
        if let Some(handle) = self.task_handle.take() {
            if timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("Bridge task did not stop in time");
            }
        }
    }
}

/// Cloneable sender side of a running [`Bridge`]
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl BridgeHandle {
    /// Queue a command issued by a published surface
    pub fn command(&self, command: SurfaceCommand) -> Result<()> {
        self.send(BridgeMessage::Command(command))
    }

    pub async fn get_settings(&self) -> Result<SettingsLayout> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeMessage::GetSettings(reply))?;
        wait(rx).await
    }

    pub async fn save_settings(
        &self,
        candidate: Configuration,
        dry_run: bool,
    ) -> Result<SettingsOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeMessage::SaveSettings {
            candidate,
            dry_run,
            reply,
        })?;
        wait(rx).await?
    }

    pub async fn link_state(&self) -> Result<LinkState> {
        let (reply, rx) = oneshot::channel();
        self.send(BridgeMessage::LinkState(reply))?;
        wait(rx).await
    }

    fn send(&self, message: BridgeMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| BridgeError::ConnectionClosed)
    }
}

async fn wait<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    match timeout(REQUEST_TIMEOUT, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
        Err(_) => Err(BridgeError::Timeout),
    }
}

async fn run(mut adapter: Adapter, mut rx: mpsc::UnboundedReceiver<BridgeMessage>) {
    let Some(mut events) = adapter.take_event_receiver() else {
        tracing::error!("Adapter event stream already taken, bridge not started");
        return;
    };

    adapter.start();

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(BridgeMessage::Shutdown) | None => {
                    tracing::info!("Bridge stopping");
                    break;
                }
                Some(message) => handle_message(&mut adapter, message),
            },
            Some(event) = events.recv() => adapter.dispatch(event),
        }
    }

    adapter.stop_session();
}

fn handle_message(adapter: &mut Adapter, message: BridgeMessage) {
    match message {
        BridgeMessage::Command(command) => adapter.handle_command(command),
        BridgeMessage::GetSettings(reply) => {
            let _ = reply.send(adapter.get_settings());
        }
        BridgeMessage::SaveSettings {
            candidate,
            dry_run,
            reply,
        } => {
            let result = adapter.save_settings(candidate, dry_run);
            if let Err(e) = &result {
                tracing::error!("Failed to save settings: {}", e);
            }
            let _ = reply.send(result);
        }
        BridgeMessage::LinkState(reply) => {
            let _ = reply.send(adapter.link_state());
        }
        BridgeMessage::Shutdown => {}
    }
}
