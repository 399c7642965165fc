//! Settings management

mod app_config;

pub use app_config::{default_config_path, AppConfig, BluetoothConfig, LogLevel, SystemConfig, UiConfig};
pub use crate::error::ConfigError;

/// Serialize `Duration` values as whole milliseconds so the JSON stays hand-editable
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
