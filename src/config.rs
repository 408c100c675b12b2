//! Persisted bridge configuration
//!
//! A single record describes how to reach the amplifier and how the two
//! control surfaces map onto its sources. It is loaded once at startup and
//! replaced as a whole whenever validated settings are saved.

use crate::dialect::{Dialect, TargetKind};
use crate::error::{BridgeError, Result};
use crate::types::{SourceCode, VolumeValue, VOLUME_MAX, VOLUME_MIN};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Longest display source code the device shows on its front panel
pub const DISPLAY_SOURCE_MAX_LEN: usize = 5;

const DEFAULT_SOURCE: &str = "CD";
const DEFAULT_INITIAL_VOLUME: VolumeValue = 45;

/// Bridge configuration record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    /// Serial device path or IP address; empty means "not configured"
    #[serde(default)]
    pub connection_target: String,

    #[serde(default)]
    pub protocol_dialect: Dialect,

    /// Source selected by the convenience switch and by unmute
    #[serde(default = "default_source")]
    pub convenience_source: SourceCode,

    /// Source code the device reports while the convenience source is active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_source: Option<SourceCode>,

    #[serde(default = "default_initial_volume")]
    pub initial_volume: VolumeValue,
}

fn default_source() -> SourceCode {
    DEFAULT_SOURCE.to_string()
}

fn default_initial_volume() -> VolumeValue {
    DEFAULT_INITIAL_VOLUME
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            connection_target: String::new(),
            protocol_dialect: Dialect::default(),
            convenience_source: default_source(),
            display_source: Some(default_source()),
            initial_volume: DEFAULT_INITIAL_VOLUME,
        }
    }
}

impl Configuration {
    pub fn is_configured(&self) -> bool {
        !self.connection_target.is_empty()
    }

    /// Source code compared against device reports to decide selected/deselected
    pub fn presence_source(&self) -> &str {
        match &self.display_source {
            Some(display) if self.protocol_dialect.uses_display_source() && !display.is_empty() => {
                display
            }
            _ => &self.convenience_source,
        }
    }

    /// Whether `other` addresses the same physical link
    pub fn same_link(&self, other: &Configuration) -> bool {
        self.connection_target == other.connection_target
            && self.protocol_dialect == other.protocol_dialect
    }

    pub fn target_error(&self) -> Option<String> {
        let dialect = self.protocol_dialect;
        let max = dialect.target_max_len();
        if self.connection_target.chars().count() > max {
            return Some(format!("must be at most {} characters", max));
        }
        if dialect.target_kind() == TargetKind::Network
            && self.is_configured()
            && self.connection_target.parse::<Ipv4Addr>().is_err()
        {
            return Some("must be an IPv4 address".to_string());
        }
        None
    }

    pub fn display_source_error(&self) -> Option<String> {
        if !self.protocol_dialect.uses_display_source() {
            return None;
        }
        match self.display_source.as_deref() {
            None | Some("") => Some("must not be empty".to_string()),
            Some(code) if code.chars().count() > DISPLAY_SOURCE_MAX_LEN => Some(format!(
                "must be at most {} characters",
                DISPLAY_SOURCE_MAX_LEN
            )),
            Some(_) => None,
        }
    }

    pub fn convenience_source_error(&self) -> Option<String> {
        if self.protocol_dialect.is_known_source(&self.convenience_source) {
            None
        } else {
            Some(format!("unknown source '{}'", self.convenience_source))
        }
    }

    pub fn initial_volume_error(&self) -> Option<String> {
        if (VOLUME_MIN..=VOLUME_MAX).contains(&self.initial_volume) {
            None
        } else {
            Some(format!("must be between {} and {}", VOLUME_MIN, VOLUME_MAX))
        }
    }

    /// Check every field, returning the first problem found
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("connection_target", self.target_error()),
            ("display_source", self.display_source_error()),
            ("convenience_source", self.convenience_source_error()),
            ("initial_volume", self.initial_volume_error()),
        ];
        match checks.into_iter().find_map(|(setting, err)| err.map(|e| (setting, e))) {
            Some((setting, reason)) => Err(BridgeError::InvalidSetting { setting, reason }),
            None => Ok(()),
        }
    }

    /// Parse a stored record, accepting the older flat settings layout too
    pub fn from_json(text: &str) -> Result<Self> {
        let record: StoredRecord = serde_json::from_str(text)?;
        Ok(match record {
            StoredRecord::Legacy(legacy) => legacy.into(),
            StoredRecord::Current(config) => config,
        })
    }
}

/// Settings record written by earlier releases
#[derive(Debug, Deserialize)]
struct LegacySettings {
    #[serde(default)]
    serialport: String,
    #[serde(default)]
    ip: String,
    setsource: SourceCode,
    #[serde(default)]
    displaysource: Option<SourceCode>,
    initialvolume: VolumeValue,
    mode: Dialect,
}

impl From<LegacySettings> for Configuration {
    fn from(legacy: LegacySettings) -> Self {
        let connection_target = match legacy.mode.target_kind() {
            TargetKind::Network => legacy.ip,
            TargetKind::Serial => legacy.serialport,
        };
        // older records left the display code out when it matched the command code
        let display_source = legacy
            .displaysource
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| legacy.setsource.clone());
        Self {
            connection_target,
            protocol_dialect: legacy.mode,
            convenience_source: legacy.setsource,
            display_source: Some(display_source),
            initial_volume: legacy.initialvolume,
        }
    }
}

// Legacy is tried first: every current field has a default, so the current
// shape would otherwise swallow legacy records.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Legacy(LegacySettings),
    Current(Configuration),
}

/// Persistence hook for the configuration record
pub trait ConfigStore: Send + Sync {
    /// Load the stored record, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<Configuration>>;

    fn save(&self, config: &Configuration) -> Result<()>;

    /// Load the stored record or fall back to defaults
    fn load_or_default(&self) -> Result<Configuration> {
        Ok(self.load()?.unwrap_or_default())
    }
}

/// Stores the configuration as pretty-printed JSON in a file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<Configuration>> {
        if !self.path.exists() {
            tracing::debug!("No configuration at {}", self.path.display());
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        Configuration::from_json(&text).map(Some)
    }

    fn save(&self, config: &Configuration) -> Result<()> {
        let text = serde_json::to_string_pretty(config)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.path, text)?;
        tracing::info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the configuration in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<Configuration>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Configuration) -> Self {
        Self {
            record: Mutex::new(Some(config)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<Configuration> {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<Configuration>> {
        Ok(self.current())
    }

    fn save(&self, config: &Configuration) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(config.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn serial(target: &str) -> Configuration {
        Configuration {
            connection_target: target.to_string(),
            ..Configuration::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert!(!config.is_configured());
        assert_eq!(config.protocol_dialect, Dialect::Tn51);
        assert_eq!(config.convenience_source, "CD");
        assert_eq!(config.initial_volume, 45);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presence_source_per_dialect() {
        let mut config = serial("/dev/ttyUSB0");
        config.convenience_source = "TV".to_string();
        config.display_source = Some("DVD".to_string());
        assert_eq!(config.presence_source(), "DVD");

        config.protocol_dialect = Dialect::Zone218;
        assert_eq!(config.presence_source(), "TV");

        config.protocol_dialect = Dialect::Tn49;
        config.display_source = None;
        assert_eq!(config.presence_source(), "TV");
    }

    #[test]
    fn test_same_link() {
        let a = serial("/dev/ttyUSB0");
        let mut b = a.clone();
        b.convenience_source = "RD".to_string();
        b.initial_volume = 20;
        assert!(a.same_link(&b));

        b.protocol_dialect = Dialect::Tn49;
        assert!(!a.same_link(&b));
        assert!(!a.same_link(&serial("/dev/ttyUSB1")));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config = serial("/dev/ttyUSB0");
        config.initial_volume = 100;
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidSetting { setting: "initial_volume", .. })
        ));

        let mut config = serial("/dev/ttyUSB0");
        config.convenience_source = "ZZ".to_string();
        assert!(config.validate().is_err());

        let mut config = serial("/dev/ttyUSB0");
        config.display_source = Some("TOOLONG".to_string());
        assert!(config.display_source_error().is_some());

        let mut config = serial("192.168.1.x");
        config.protocol_dialect = Dialect::Zone218;
        assert!(config.target_error().is_some());
        config.connection_target = "192.168.1.20".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zone218_ignores_display_source() {
        let config = Configuration {
            connection_target: "10.0.0.5".to_string(),
            protocol_dialect: Dialect::Zone218,
            display_source: None,
            ..Configuration::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_current_record() {
        let text = r#"{
            "connection_target": "/dev/ttyS0",
            "protocol_dialect": "TN49",
            "convenience_source": "TV",
            "display_source": "TV",
            "initial_volume": 30
        }"#;
        let config = Configuration::from_json(text).unwrap();
        assert_eq!(config.connection_target, "/dev/ttyS0");
        assert_eq!(config.protocol_dialect, Dialect::Tn49);
        assert_eq!(config.initial_volume, 30);
    }

    #[test]
    fn test_from_json_legacy_record() {
        let text = r#"{
            "serialport": "/dev/ttyUSB0",
            "ip": "10.0.0.9",
            "setsource": "RD",
            "displaysource": "RADIO",
            "initialvolume": 50,
            "mode": "TN51"
        }"#;
        let config = Configuration::from_json(text).unwrap();
        assert_eq!(config.connection_target, "/dev/ttyUSB0");
        assert_eq!(config.convenience_source, "RD");
        assert_eq!(config.display_source.as_deref(), Some("RADIO"));

        let text = r#"{"serialport": "", "ip": "10.0.0.9", "setsource": "CD", "initialvolume": 45, "mode": "218"}"#;
        let config = Configuration::from_json(text).unwrap();
        assert_eq!(config.connection_target, "10.0.0.9");
        assert_eq!(config.protocol_dialect, Dialect::Zone218);
    }

    #[test]
    fn test_legacy_record_without_display_source() {
        let text = r#"{"serialport": "/dev/ttyUSB0", "setsource": "TV", "initialvolume": 40, "mode": "TN51"}"#;
        let config = Configuration::from_json(text).unwrap();
        assert_eq!(config.display_source.as_deref(), Some("TV"));
        assert!(config.validate().is_ok());

        let text = r#"{"serialport": "/dev/ttyUSB0", "setsource": "TV", "displaysource": "", "initialvolume": 40, "mode": "TN49"}"#;
        let config = Configuration::from_json(text).unwrap();
        assert_eq!(config.presence_source(), "TV");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lengths_count_characters() {
        let mut config = serial(&"é".repeat(Dialect::Tn51.target_max_len()));
        config.display_source = Some("ÉÉÉÉÉ".to_string());
        assert!(config.target_error().is_none());
        assert!(config.display_source_error().is_none());

        config.connection_target.push('é');
        config.display_source = Some("ÉÉÉÉÉÉ".to_string());
        assert!(config.target_error().is_some());
        assert!(config.display_source_error().is_some());
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.load_or_default().unwrap(), Configuration::default());

        let config = serial("/dev/ttyUSB3");
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), Some(config));
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(BridgeError::Json(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&serial("/dev/ttyS1")).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current().unwrap().connection_target, "/dev/ttyS1");
    }
}
