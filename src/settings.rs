//! Settings form description
//!
//! The host renders whatever fields [`make_layout`] returns. Building the
//! layout also validates the candidate values, so the same call answers both
//! "what should the form show" and "may these values be saved".

use crate::config::{Configuration, DISPLAY_SOURCE_MAX_LEN};
use crate::dialect::{Dialect, TargetKind};
use crate::types::{CompleteStatus, VOLUME_MAX, VOLUME_MIN};
use serde::Serialize;

/// Choice offered by a dropdown field
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DropdownValue {
    pub value: String,
    pub title: String,
}

/// One editable field of the settings form
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SettingsField {
    Dropdown {
        title: String,
        setting: &'static str,
        values: Vec<DropdownValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "string")]
    Text {
        title: String,
        setting: &'static str,
        maxlength: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Integer {
        title: String,
        setting: &'static str,
        min: i32,
        max: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl SettingsField {
    /// Configuration key edited by this field
    pub fn setting(&self) -> &'static str {
        match self {
            SettingsField::Dropdown { setting, .. }
            | SettingsField::Text { setting, .. }
            | SettingsField::Integer { setting, .. } => setting,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SettingsField::Dropdown { error, .. }
            | SettingsField::Text { error, .. }
            | SettingsField::Integer { error, .. } => error.as_deref(),
        }
    }
}

/// Field list plus the values it was built from
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettingsLayout {
    pub values: Configuration,
    pub layout: Vec<SettingsField>,
    pub has_error: bool,
}

impl SettingsLayout {
    pub fn field(&self, setting: &str) -> Option<&SettingsField> {
        self.layout.iter().find(|f| f.setting() == setting)
    }
}

/// Answer to a `save_settings` call
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettingsOutcome {
    /// `Success` or `NotValid`
    pub status: CompleteStatus,
    pub settings: SettingsLayout,
}

/// Build the settings form for `values`, flagging every invalid field
pub fn make_layout(values: &Configuration) -> SettingsLayout {
    let dialect = values.protocol_dialect;
    let mut layout = Vec::new();

    layout.push(SettingsField::Dropdown {
        title: "Protocol Mode".to_string(),
        setting: "protocol_dialect",
        values: Dialect::ALL
            .iter()
            .map(|d| DropdownValue {
                value: d.code().to_string(),
                title: d.code().to_string(),
            })
            .collect(),
        error: None,
    });

    let target_title = match dialect.target_kind() {
        TargetKind::Network => "IP Address",
        TargetKind::Serial => "Serial Port",
    };
    layout.push(SettingsField::Text {
        title: target_title.to_string(),
        setting: "connection_target",
        maxlength: dialect.target_max_len(),
        error: values.target_error(),
    });

    if dialect.uses_display_source() {
        layout.push(SettingsField::Text {
            title: "Source displayed on device (select source and see what speakers display)"
                .to_string(),
            setting: "display_source",
            maxlength: DISPLAY_SOURCE_MAX_LEN,
            error: values.display_source_error(),
        });
    }

    layout.push(SettingsField::Dropdown {
        title: "Source for Convenience Switch".to_string(),
        setting: "convenience_source",
        values: dialect
            .sources()
            .iter()
            .map(|s| DropdownValue {
                value: s.code.to_string(),
                title: s.title.to_string(),
            })
            .collect(),
        error: values.convenience_source_error(),
    });

    layout.push(SettingsField::Integer {
        title: "Initial Volume".to_string(),
        setting: "initial_volume",
        min: VOLUME_MIN,
        max: VOLUME_MAX,
        error: values.initial_volume_error(),
    });

    let has_error = layout.iter().any(|f| f.error().is_some());

    SettingsLayout {
        values: values.clone(),
        layout,
        has_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_layout_fields() {
        let layout = make_layout(&Configuration::default());
        let settings: Vec<_> = layout.layout.iter().map(|f| f.setting()).collect();
        assert_eq!(
            settings,
            vec![
                "protocol_dialect",
                "connection_target",
                "display_source",
                "convenience_source",
                "initial_volume"
            ]
        );
        assert!(!layout.has_error);

        match layout.field("connection_target") {
            Some(SettingsField::Text { title, maxlength, .. }) => {
                assert_eq!(title, "Serial Port");
                assert_eq!(*maxlength, 256);
            }
            other => panic!("unexpected field: {:?}", other),
        }
    }

    #[test]
    fn test_network_layout_drops_display_source() {
        let config = Configuration {
            connection_target: "192.168.0.40".to_string(),
            protocol_dialect: Dialect::Zone218,
            ..Configuration::default()
        };
        let layout = make_layout(&config);
        assert!(layout.field("display_source").is_none());
        match layout.field("connection_target") {
            Some(SettingsField::Text { title, maxlength, .. }) => {
                assert_eq!(title, "IP Address");
                assert_eq!(*maxlength, 15);
            }
            other => panic!("unexpected field: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_flag_fields() {
        let config = Configuration {
            initial_volume: 0,
            convenience_source: "??".to_string(),
            ..Configuration::default()
        };
        let layout = make_layout(&config);
        assert!(layout.has_error);
        assert!(layout.field("initial_volume").unwrap().error().is_some());
        assert!(layout.field("convenience_source").unwrap().error().is_some());
        assert!(layout.field("connection_target").unwrap().error().is_none());
    }

    #[test]
    fn test_layout_json_shape() {
        let layout = make_layout(&Configuration::default());
        let json = serde_json::to_value(&layout).unwrap();
        assert_eq!(json["layout"][0]["type"], "dropdown");
        assert_eq!(json["layout"][1]["type"], "string");
        assert_eq!(json["layout"][4]["type"], "integer");
        assert_eq!(json["layout"][4]["max"], 99);
        assert_eq!(json["values"]["protocol_dialect"], "TN51");
        assert_eq!(json["has_error"], false);
    }
}
