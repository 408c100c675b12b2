//! Keeps a Meridian amplifier and its media-platform control surfaces in sync
//!
//! The amplifier is reached over RS232 or a network controller through a
//! [`Driver`]. The bridge publishes two surfaces on the host platform and
//! keeps them consistent with the device:
//!
//! - a volume surface (1..=99, mute)
//! - a source/power surface (selected / deselected / standby, convenience
//!   switch, standby command)
//!
//! It survives link loss, and rebuilds the session when the serial port,
//! address or protocol dialect changes at runtime.
//!
//! # Quick Start
//!
//! ```no_run
//! use meridian_bridge::mock::MockEnv;
//! use meridian_bridge::{Adapter, Bridge, Configuration, Dialect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Swap the mocks for the platform's driver and surface host
//!     let env = MockEnv::new();
//!     let adapter = Adapter::from_store(env.services())?;
//!
//!     let mut bridge = Bridge::spawn(adapter);
//!     let handle = bridge.handle();
//!
//!     // Point the bridge at a serial port
//!     let outcome = handle
//!         .save_settings(
//!             Configuration {
//!                 connection_target: "/dev/ttyUSB0".to_string(),
//!                 protocol_dialect: Dialect::Tn51,
//!                 ..Configuration::default()
//!             },
//!             false,
//!         )
//!         .await?;
//!     println!("Settings: {:?}", outcome.status);
//!
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Bridge**: Tokio task that exclusively owns the adapter
//! - **Adapter**: session lifecycle, event normalization, command handling
//! - **Driver / Surfaces / Status / Store**: capability traits implemented by
//!   the host platform
//! - **Dialect**: sentinel codes, addressing and sources per protocol variant
//! - **Config / Settings**: persisted record and the settings form

mod adapter;
mod bridge;
mod config;
mod dialect;
mod driver;
mod error;
pub mod mock;
mod session;
mod settings;
mod status;
mod surface;
mod types;

// Public exports
pub use adapter::{Adapter, Services, NOT_CONFIGURED};
pub use bridge::{Bridge, BridgeHandle};
pub use config::{ConfigStore, Configuration, JsonFileStore, MemoryStore};
pub use dialect::{Dialect, SourceOption, TargetKind};
pub use driver::{
    Completion, CompletionSender, DeviceEvent, Driver, DriverFactory, EventSink, SessionEvent,
    SessionId, StartOptions,
};
pub use error::{BridgeError, Result};
pub use session::{project_source_status, project_volume};
pub use settings::{make_layout, DropdownValue, SettingsField, SettingsLayout, SettingsOutcome};
pub use status::{LogStatus, StatusSink};
pub use surface::{
    CompletionReceiver, Request, SourceSurface, SurfaceCommand, SurfaceHost, SurfaceId,
    VolumeSurface,
};
pub use types::{
    CompleteStatus, DeviceSnapshot, DeviceSource, LinkState, MuteAction, SourceCode, SourceState,
    SourceStatus, SourceUpdate, VolumeMode, VolumeState, VolumeUpdate, VolumeValue,
    FALLBACK_VOLUME, VOLUME_MAX, VOLUME_MIN, VOLUME_STEP,
};
