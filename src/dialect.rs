use crate::types::DeviceSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol dialect spoken by the amplifier
///
/// The dialect decides how the link is addressed, which sentinel codes the
/// device uses on its source channel and which settings apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[serde(rename = "TN49")]
    Tn49,
    #[default]
    #[serde(rename = "TN51")]
    Tn51,
    #[serde(rename = "218")]
    Zone218,
}

/// How a dialect reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Serial device path such as `/dev/ttyUSB0`
    Serial,
    /// IPv4 address of a networked controller
    Network,
}

/// Entry in the source enumeration offered for the convenience switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOption {
    pub code: &'static str,
    pub title: &'static str,
}

const SOURCES: &[SourceOption] = &[
    SourceOption { code: "CD", title: "CD" },
    SourceOption { code: "RD", title: "Radio" },
    SourceOption { code: "LP", title: "LP/Aux/SLS" },
    SourceOption { code: "TV", title: "TV" },
    SourceOption { code: "T1", title: "Tape/Tape1/iPod" },
    SourceOption { code: "T2", title: "Tape2/Sat" },
    SourceOption { code: "CR", title: "CDR/Disc" },
    SourceOption { code: "CB", title: "Cable" },
    SourceOption { code: "TX", title: "Text/DVD" },
    SourceOption { code: "V1", title: "VCR1/Mixer/PVR" },
    SourceOption { code: "V2", title: "VCR2/USB" },
    SourceOption { code: "LD", title: "LDisc/Game" },
];

impl Dialect {
    /// Every dialect, in the order offered by the settings form
    pub const ALL: [Dialect; 3] = [Dialect::Tn49, Dialect::Tn51, Dialect::Zone218];

    /// Wire name, identical to the serialized form
    pub fn code(self) -> &'static str {
        match self {
            Dialect::Tn49 => "TN49",
            Dialect::Tn51 => "TN51",
            Dialect::Zone218 => "218",
        }
    }

    pub fn target_kind(self) -> TargetKind {
        match self {
            Dialect::Tn49 | Dialect::Tn51 => TargetKind::Serial,
            Dialect::Zone218 => TargetKind::Network,
        }
    }

    /// Code reported on the source channel while the device is muted
    pub fn mute_sentinel(self) -> &'static str {
        match self {
            Dialect::Tn49 | Dialect::Tn51 => "Muted",
            Dialect::Zone218 => "MU",
        }
    }

    /// Code reported on the source channel while the device is in standby
    pub fn standby_sentinel(self) -> &'static str {
        match self {
            Dialect::Tn49 | Dialect::Tn51 => "Standby",
            Dialect::Zone218 => "SB",
        }
    }

    /// Whether the device displays a different code than the one commanded,
    /// so a separate display source must be configured
    pub fn uses_display_source(self) -> bool {
        matches!(self, Dialect::Tn49 | Dialect::Tn51)
    }

    /// Maximum length of the connection target setting
    pub fn target_max_len(self) -> usize {
        match self.target_kind() {
            TargetKind::Serial => 256,
            TargetKind::Network => 15,
        }
    }

    /// Human readable link name used in status messages
    pub fn link_label(self) -> &'static str {
        match self {
            Dialect::Tn49 | Dialect::Tn51 => "Meridian RS232",
            Dialect::Zone218 => "Meridian 218",
        }
    }

    /// Sources the convenience switch may select
    pub fn sources(self) -> &'static [SourceOption] {
        SOURCES
    }

    pub fn is_known_source(self, code: &str) -> bool {
        self.sources().iter().any(|s| s.code == code)
    }

    /// Normalize a raw source-channel code reported by the driver
    pub fn classify(self, raw: &str) -> DeviceSource {
        if raw == self.mute_sentinel() {
            DeviceSource::Muted
        } else if raw == self.standby_sentinel() {
            DeviceSource::Standby
        } else {
            DeviceSource::Source(raw.to_string())
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
