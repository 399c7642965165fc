//! Device records produced by enumeration

use std::fmt;

/// Connectivity technology of a paired device.
///
/// Only classic devices expose `DEVPKEY_Device_BatteryLevel` through the PnP
/// property store, so they are the only kind the prober can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Classic (BR/EDR) device registered as a PnP entity
    Classic,
    /// Bluetooth Low Energy device; battery lives behind GATT
    LowEnergy,
}

impl DeviceKind {
    /// Whether the PnP battery property can be read for this kind
    pub fn is_queryable(self) -> bool {
        matches!(self, DeviceKind::Classic)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Classic => f.write_str("pnp"),
            DeviceKind::LowEnergy => f.write_str("ble"),
        }
    }
}

/// A paired device that reported a battery level during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Friendly name shown in the menu
    pub name: String,
    /// Platform instance identifier, e.g. `BTHENUM\{0000111E-...}_LOCALMFG&005D\...`
    pub instance_id: String,
    /// Connectivity kind
    pub kind: DeviceKind,
    /// Battery percentage seen when the record was produced
    pub battery: Option<u8>,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, instance_id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            instance_id: instance_id.into(),
            kind,
            battery: None,
        }
    }

    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery = Some(level);
        self
    }

    /// Label used for the device's menu entry
    pub fn menu_label(&self) -> String {
        match self.battery {
            Some(level) => format!("{} ({}%)", self.name, level),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_classic_is_queryable() {
        assert!(DeviceKind::Classic.is_queryable());
        assert!(!DeviceKind::LowEnergy.is_queryable());
    }

    #[test]
    fn test_menu_label() {
        let record = DeviceRecord::new("WH-1000XM4", "BTHENUM\\A", DeviceKind::Classic);
        assert_eq!(record.menu_label(), "WH-1000XM4");
        assert_eq!(record.with_battery(55).menu_label(), "WH-1000XM4 (55%)");
    }
}
