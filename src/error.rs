use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while bridging the amplifier to its control surfaces
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The driver link or an internal channel was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for the bridge task
    #[error("Request timeout")]
    Timeout,

    /// A driver primitive was used before `start`
    #[error("Driver not started")]
    NotStarted,

    /// The driver reported a failure for a command
    #[error("Driver error: {detail}")]
    Driver {
        /// Error detail reported by the driver
        detail: String,
    },

    /// A configuration field failed validation
    #[error("Invalid setting '{setting}': {reason}")]
    InvalidSetting {
        /// Name of the offending setting
        setting: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Shorthand for a driver-reported failure
    pub fn driver(detail: impl Into<String>) -> Self {
        Self::Driver {
            detail: detail.into(),
        }
    }
}
