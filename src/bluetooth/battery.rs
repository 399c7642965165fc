//! Battery level queries through the PnP property store

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use super::device::DeviceKind;
use super::powershell::{single_quoted, CommandOutput, CommandRunner};

/// Property key holding the battery percentage of hands-free / A2DP devices
const BATTERY_PROPERTY_KEY: &str = "DEVPKEY_Device_BatteryLevel";

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"[0-9]+").unwrap();
}

/// Result of a single battery query.
///
/// Display code folds everything but `Present` into "no reading", but the
/// variants stay distinct so logs can tell a missing sensor from a hung query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The device reported this percentage
    Present(u8),
    /// The query ran but returned no usable number
    Absent,
    /// The device kind cannot be queried
    Unsupported,
    /// The query did not finish in time
    Timeout,
    /// The query could not be run at all
    Failed(String),
}

impl ProbeOutcome {
    pub fn level(&self) -> Option<u8> {
        match self {
            ProbeOutcome::Present(level) => Some(*level),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Present(level) => write!(f, "{}%", level),
            ProbeOutcome::Absent => f.write_str("no battery reading"),
            ProbeOutcome::Unsupported => f.write_str("unsupported device kind"),
            ProbeOutcome::Timeout => f.write_str("query timed out"),
            ProbeOutcome::Failed(reason) => write!(f, "query failed: {}", reason),
        }
    }
}

/// PowerShell script printing the battery property of one device
pub fn battery_query_script(instance_id: &str) -> String {
    format!(
        "(Get-PnpDeviceProperty -InstanceId {} -KeyName '{}' -ErrorAction SilentlyContinue).Data",
        single_quoted(instance_id),
        BATTERY_PROPERTY_KEY
    )
}

/// Take the first run of decimal digits in `text` as a percentage.
///
/// Readings above 100 are clamped; a run too long for `u32` is no reading.
pub fn parse_battery_level(text: &str) -> Option<u8> {
    let digits = DIGIT_RUN.find(text)?;
    let value: u32 = digits.as_str().parse().ok()?;
    Some(value.min(100) as u8)
}

/// Turn captured process output into an outcome
pub fn interpret_output(output: &CommandOutput) -> ProbeOutcome {
    if !output.success() {
        return ProbeOutcome::Absent;
    }
    match parse_battery_level(output.stdout.trim()) {
        Some(level) => ProbeOutcome::Present(level),
        None => ProbeOutcome::Absent,
    }
}

/// Queries one device's battery percentage
#[derive(Clone)]
pub struct BatteryProber {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl BatteryProber {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one property query, bounded by the configured timeout
    pub async fn probe(&self, instance_id: &str, kind: DeviceKind) -> ProbeOutcome {
        if !kind.is_queryable() {
            log::error!(
                "Got a {} device where only pnp devices can be probed: {}",
                kind,
                instance_id
            );
            return ProbeOutcome::Unsupported;
        }

        let script = battery_query_script(instance_id);
        match tokio::time::timeout(self.timeout, self.runner.run(&script)).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => ProbeOutcome::Failed(e.to_string()),
            Ok(Ok(output)) => interpret_output(&output),
        }
    }
}
