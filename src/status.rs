/// Host status line shown next to the bridge
pub trait StatusSink: Send + Sync {
    fn set_status(&self, message: &str, is_error: bool);
}

/// Status sink that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn set_status(&self, message: &str, is_error: bool) {
        if is_error {
            tracing::warn!("Status: {}", message);
        } else {
            tracing::info!("Status: {}", message);
        }
    }
}
