//! Error types for TrayBTB

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// System tray error
    #[error("System tray error: {0}")]
    Tray(#[from] TrayError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The polling loop itself failed
    #[error("Main loop error: {0}")]
    MainLoop(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised while querying the platform device inventory
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// The external query process could not be started or awaited
    #[error("Failed to run device query: {0}")]
    Process(#[from] std::io::Error),

    /// The query process exited with a failure status
    #[error("Device query exited with status {code:?}: {stderr}")]
    QueryFailed { code: Option<i32>, stderr: String },

    /// The query did not finish in time
    #[error("Device query timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// The query output could not be understood
    #[error("Invalid device query output: {0}")]
    InvalidData(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading or writing the config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of its accepted range
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// System tray errors
#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Failed to create tray item: {0}")]
    Creation(String),

    #[error("Failed to build menu: {0}")]
    Menu(String),

    #[error("Failed to set icon: {0}")]
    SetIcon(String),

    #[error("Failed to set tooltip: {0}")]
    SetTooltip(String),

    #[error("Tray UI thread stopped unexpectedly")]
    ThreadStopped,

    #[error("The system tray is only supported on Windows")]
    UnsupportedPlatform,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::MainLoop("tray event channel closed".to_string());
        assert_eq!(err.to_string(), "Main loop error: tray event channel closed");
    }

    #[test]
    fn test_config_error_converts_into_app_error() {
        let err: AppError = ConfigError::invalid("ui.error_threshold", "must be at least 1").into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for ui.error_threshold: must be at least 1"
        );
    }

    #[test]
    fn test_query_failed_display() {
        let err = BluetoothError::QueryFailed {
            code: Some(1),
            stderr: "access denied".to_string(),
        };
        assert!(err.to_string().contains("status Some(1)"));
        assert!(err.to_string().contains("access denied"));
    }
}
