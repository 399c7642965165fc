use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration_ms;
use crate::error::ConfigError;

/// Name substrings that mark a device as a plausible battery reporter
const DEFAULT_NAME_PATTERNS: [&str; 7] = [
    "Headphone",
    "Headphones",
    "Audio",
    "Hands-Free",
    "AirPods",
    "WH",
    "BT",
];

/// AUMID of Windows PowerShell, which unpackaged apps can borrow to show toasts
const DEFAULT_APP_ID: &str =
    "{1AC14E77-02E7-4E5D-B744-2EB1AE5198B7}\\WindowsPowerShell\\v1.0\\powershell.exe";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Device discovery and probing
    pub bluetooth: BluetoothConfig,

    /// Tray, polling and notification behaviour
    pub ui: UiConfig,

    /// Logging
    pub system: SystemConfig,
}

/// Device discovery and probing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Case-insensitive substrings a device name must contain (any of)
    pub name_patterns: Vec<String>,

    /// Upper bound for a single battery property query
    #[serde(with = "duration_ms")]
    pub probe_timeout: Duration,

    /// How many property queries may run at once during enumeration
    pub max_concurrent_probes: usize,

    /// Explicit PowerShell executable; detected from PATH when unset
    pub powershell_path: Option<PathBuf>,
}

/// Tray, polling and notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Interval between state ticks
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Minimum time between two native menu rebuilds
    #[serde(with = "duration_ms")]
    pub menu_debounce: Duration,

    /// Consecutive failed ticks before the device is dropped
    pub error_threshold: u32,

    /// Battery level (inclusive) at which the low battery toast fires
    pub low_battery_threshold: u8,

    /// Fire the low battery toast on every tick instead of once per drop
    pub repeat_low_battery_alert: bool,

    /// Play the reminder sound with toasts
    pub notification_sound: bool,

    /// Application user model id used to show toasts
    pub app_id: String,

    /// Image shown in toasts
    pub icon_path: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Minimum level written to the log
    pub log_level: LogLevel,

    /// Directory that receives one log file per run
    pub log_dir: PathBuf,

    /// Mirror log lines to stderr
    pub console_log: bool,
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            name_patterns: DEFAULT_NAME_PATTERNS.iter().map(|p| p.to_string()).collect(),
            probe_timeout: Duration::from_secs(8),
            max_concurrent_probes: 12,
            powershell_path: None,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            menu_debounce: Duration::from_millis(100),
            error_threshold: 10,
            low_battery_threshold: 20,
            repeat_low_battery_alert: false,
            notification_sound: true,
            app_id: DEFAULT_APP_ID.to_string(),
            icon_path: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: PathBuf::from("logs"),
            console_log: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bluetooth: BluetoothConfig::default(),
            ui: UiConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&default_config_path())
    }

    /// Load configuration from a file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check every value against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.bluetooth;
        if bt.name_patterns.is_empty() {
            return Err(ConfigError::invalid(
                "bluetooth.name_patterns",
                "at least one pattern is required",
            ));
        }
        for pattern in &bt.name_patterns {
            if !is_safe_pattern(pattern) {
                return Err(ConfigError::invalid(
                    "bluetooth.name_patterns",
                    format!("'{}' may only contain letters, digits, spaces and '-'", pattern),
                ));
            }
        }
        if bt.probe_timeout < Duration::from_secs(1) || bt.probe_timeout > Duration::from_secs(60) {
            return Err(ConfigError::invalid(
                "bluetooth.probe_timeout",
                "must be between 1 and 60 seconds",
            ));
        }
        if !(1..=64).contains(&bt.max_concurrent_probes) {
            return Err(ConfigError::invalid(
                "bluetooth.max_concurrent_probes",
                "must be between 1 and 64",
            ));
        }

        let ui = &self.ui;
        if ui.poll_interval < Duration::from_millis(100) || ui.poll_interval > Duration::from_secs(60) {
            return Err(ConfigError::invalid(
                "ui.poll_interval",
                "must be between 100 ms and 60 seconds",
            ));
        }
        if ui.error_threshold == 0 {
            return Err(ConfigError::invalid("ui.error_threshold", "must be at least 1"));
        }
        if ui.low_battery_threshold > 100 {
            return Err(ConfigError::invalid(
                "ui.low_battery_threshold",
                "must be a percentage (0-100)",
            ));
        }
        if ui.app_id.trim().is_empty() {
            return Err(ConfigError::invalid("ui.app_id", "must not be empty"));
        }

        Ok(())
    }
}

/// Patterns end up inside a WQL string literal, so keep them to a harmless alphabet
fn is_safe_pattern(pattern: &str) -> bool {
    !pattern.trim().is_empty()
        && pattern
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '-')
}

/// Get the default config path
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|config_dir| config_dir.join("traybtb").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}
