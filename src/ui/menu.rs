//! Tray menu model
//!
//! The menu is described as plain data and rebuilt from scratch whenever the
//! device list or the selection changes. Every clickable item carries a
//! string id bound to its own [`MenuAction`], so device items hold their own
//! copy of the record they select.

use std::collections::HashMap;

use crate::bluetooth::DeviceRecord;

pub const LABEL_REFRESH: &str = "Update devices";
pub const LABEL_DEVICES: &str = "Devices";
pub const LABEL_NO_DEVICES: &str = "No devices";
pub const LABEL_DISCONNECT: &str = "Disconnect device";
pub const LABEL_EXIT: &str = "Exit";

const ID_REFRESH: &str = "refresh";
const ID_DISCONNECT: &str = "disconnect";
const ID_EXIT: &str = "exit";
const ID_NO_DEVICES: &str = "no-devices";

/// What a menu click asks the controller to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Refresh,
    Select(DeviceRecord),
    Disconnect,
    Exit,
}

/// A single clickable (or greyed out) item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemSpec {
    pub id: String,
    pub label: String,
    pub enabled: bool,
}

impl MenuItemSpec {
    fn new(id: impl Into<String>, label: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            enabled,
        }
    }
}

/// Top-level menu entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEntry {
    Item(MenuItemSpec),
    Submenu { label: String, items: Vec<MenuItemSpec> },
}

/// Complete menu with its click bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuModel {
    entries: Vec<MenuEntry>,
    bindings: HashMap<String, MenuAction>,
}

impl MenuModel {
    /// Build the menu for the given device list. `connected` adds the
    /// disconnect item.
    pub fn build(devices: &[DeviceRecord], connected: bool) -> Self {
        let mut bindings = HashMap::new();
        let mut entries = Vec::new();

        entries.push(MenuEntry::Item(MenuItemSpec::new(ID_REFRESH, LABEL_REFRESH, true)));
        bindings.insert(ID_REFRESH.to_string(), MenuAction::Refresh);

        let device_items = if devices.is_empty() {
            vec![MenuItemSpec::new(ID_NO_DEVICES, LABEL_NO_DEVICES, false)]
        } else {
            devices
                .iter()
                .enumerate()
                .map(|(index, device)| {
                    let id = format!("device-{}", index);
                    bindings.insert(id.clone(), MenuAction::Select(device.clone()));
                    MenuItemSpec::new(id, device.menu_label(), true)
                })
                .collect()
        };
        entries.push(MenuEntry::Submenu {
            label: LABEL_DEVICES.to_string(),
            items: device_items,
        });

        if connected {
            entries.push(MenuEntry::Item(MenuItemSpec::new(ID_DISCONNECT, LABEL_DISCONNECT, true)));
            bindings.insert(ID_DISCONNECT.to_string(), MenuAction::Disconnect);
        }

        entries.push(MenuEntry::Item(MenuItemSpec::new(ID_EXIT, LABEL_EXIT, true)));
        bindings.insert(ID_EXIT.to_string(), MenuAction::Exit);

        Self { entries, bindings }
    }

    pub fn entries(&self) -> &[MenuEntry] {
        &self.entries
    }

    /// Action bound to a clicked item id
    pub fn action_for(&self, id: &str) -> Option<&MenuAction> {
        self.bindings.get(id)
    }

    /// Top-level labels, in order
    pub fn labels(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| match entry {
                MenuEntry::Item(item) => item.label.as_str(),
                MenuEntry::Submenu { label, .. } => label.as_str(),
            })
            .collect()
    }

    /// Items of the devices submenu
    pub fn device_items(&self) -> &[MenuItemSpec] {
        self.entries
            .iter()
            .find_map(|entry| match entry {
                MenuEntry::Submenu { items, .. } => Some(items.as_slice()),
                MenuEntry::Item(_) => None,
            })
            .unwrap_or(&[])
    }
}
