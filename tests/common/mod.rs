//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use traybtb::bluetooth::{CommandOutput, CommandRunner};
use traybtb::ui::Notifier;

/// A paired device as the fake shell sees it
#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub instance_id: &'static str,
    pub name: &'static str,
    pub level: Option<u8>,
    pub delay: Duration,
}

impl FakeDevice {
    pub fn new(instance_id: &'static str, name: &'static str, level: Option<u8>, delay_ms: u64) -> Self {
        Self {
            instance_id,
            name,
            level,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Answers inventory and battery scripts from a fixed device table
pub struct FakePowerShell {
    devices: Vec<FakeDevice>,
    inventory_fails: bool,
    inventory_delay: Duration,
}

impl FakePowerShell {
    pub fn new(devices: Vec<FakeDevice>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            inventory_fails: false,
            inventory_delay: Duration::ZERO,
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            devices: Vec::new(),
            inventory_fails: true,
            inventory_delay: Duration::ZERO,
        })
    }

    /// Inventory query that takes `delay` before answering
    pub fn slow_inventory(devices: Vec<FakeDevice>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            devices,
            inventory_fails: false,
            inventory_delay: delay,
        })
    }

    fn inventory(&self) -> CommandOutput {
        if self.inventory_fails {
            return CommandOutput::failed(1, "Get-CimInstance : Access denied");
        }
        let rows: Vec<_> = self
            .devices
            .iter()
            .map(|device| json!({ "PNPDeviceID": device.instance_id, "Name": device.name }))
            .collect();
        CommandOutput::ok(serde_json::Value::Array(rows).to_string())
    }
}

#[async_trait]
impl CommandRunner for FakePowerShell {
    async fn run(&self, script: &str) -> io::Result<CommandOutput> {
        if script.contains("Win32_PnPEntity") {
            tokio::time::sleep(self.inventory_delay).await;
            return Ok(self.inventory());
        }

        let Some(device) = self
            .devices
            .iter()
            .find(|device| script.contains(&format!("'{}'", device.instance_id)))
        else {
            return Ok(CommandOutput::failed(1, "device not found"));
        };

        tokio::time::sleep(device.delay).await;
        Ok(match device.level {
            Some(level) => CommandOutput::ok(format!("{}\r\n", level)),
            None => CommandOutput::ok(""),
        })
    }
}

/// Keeps every message it was asked to show
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, message: &str) -> usize {
        self.messages().iter().filter(|m| m.as_str() == message).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}
