use serde::{Deserialize, Serialize};

/// Volume value on the device's 1..=99 scale
pub type VolumeValue = i32;

/// Two-letter source code understood by the device (e.g. "CD", "TV")
pub type SourceCode = String;

/// Lowest volume a control surface may command
pub const VOLUME_MIN: VolumeValue = 1;

/// Highest volume a control surface may command
pub const VOLUME_MAX: VolumeValue = 99;

/// Volume surface step size
pub const VOLUME_STEP: VolumeValue = 1;

/// Volume shown when the device reports zero or nothing at connect time
pub const FALLBACK_VOLUME: VolumeValue = 65;

/// Name under which both surfaces are published
pub const DISPLAY_NAME: &str = "Meridian";

/// How a `set_volume` value is interpreted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMode {
    Absolute,
    Relative,
}

/// Mute request coming from the volume surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MuteAction {
    On,
    Off,
    Toggle,
}

/// Completion status reported back to a surface or settings caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompleteStatus {
    Success,
    Failed,
    NotValid,
}

/// Normalized value of the device's source channel
///
/// The device reports mute and standby on the same channel as the selected
/// input, using dialect-specific sentinel codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    Muted,
    Standby,
    Source(SourceCode),
}

/// Last known device telemetry, owned by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Reported volume, `None` until the device has told us
    pub volume: Option<VolumeValue>,

    /// Raw code last reported on the source channel
    pub source: Option<SourceCode>,

    pub connected: bool,
}

/// Three-state status of the source/power surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Selected,
    Deselected,
    Standby,
}

/// State published through the volume surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeState {
    pub display_name: String,
    pub volume_type: String,
    pub volume_min: VolumeValue,
    pub volume_max: VolumeValue,
    pub volume_step: VolumeValue,
    pub volume_value: VolumeValue,
    pub is_muted: bool,
}

impl VolumeState {
    /// Build a state with the fixed 1..=99 range
    pub fn new(volume_value: VolumeValue, is_muted: bool) -> Self {
        Self {
            display_name: DISPLAY_NAME.to_string(),
            volume_type: "number".to_string(),
            volume_min: VOLUME_MIN,
            volume_max: VOLUME_MAX,
            volume_step: VOLUME_STEP,
            volume_value,
            is_muted,
        }
    }

    /// Clamp a requested volume into this surface's range
    pub fn clamp(&self, value: VolumeValue) -> VolumeValue {
        value.clamp(self.volume_min, self.volume_max)
    }

    /// Merge a partial update into this state
    pub fn apply(&mut self, update: &VolumeUpdate) {
        if let Some(volume) = update.volume_value {
            self.volume_value = volume;
        }
        if let Some(muted) = update.is_muted {
            self.is_muted = muted;
        }
    }
}

/// State published through the source/power surface
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceState {
    pub display_name: String,
    pub supports_standby: bool,
    pub status: SourceStatus,
}

impl SourceState {
    pub fn new(status: SourceStatus) -> Self {
        Self {
            display_name: DISPLAY_NAME.to_string(),
            supports_standby: true,
            status,
        }
    }

    pub fn apply(&mut self, update: &SourceUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
    }
}

/// Partial update for the volume surface; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_value: Option<VolumeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

impl VolumeUpdate {
    pub fn volume(volume_value: VolumeValue) -> Self {
        Self {
            volume_value: Some(volume_value),
            ..Self::default()
        }
    }

    pub fn muted(is_muted: bool) -> Self {
        Self {
            is_muted: Some(is_muted),
            ..Self::default()
        }
    }
}

/// Partial update for the source/power surface
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SourceStatus>,
}

impl SourceUpdate {
    pub fn status(status: SourceStatus) -> Self {
        Self {
            status: Some(status),
        }
    }
}

/// Where the adapter's current session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A session exists but has no connection target
    Unconfigured,
    /// The driver was started and has not reported a connection yet
    Connecting,
    Connected,
    /// The link dropped; the driver retries on its own
    Disconnected,
    /// No session exists
    TornDown,
}
