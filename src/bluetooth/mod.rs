//! Paired device discovery and battery probing

pub mod battery;
pub mod device;
pub mod filter;
pub mod inventory;
pub mod powershell;

pub use battery::{BatteryProber, ProbeOutcome};
pub use device::{DeviceKind, DeviceRecord};
pub use filter::NameFilter;
pub use inventory::{Candidate, DeviceEnumerator};
pub use powershell::{CommandOutput, CommandRunner, PowerShell};
