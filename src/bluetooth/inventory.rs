//! Device enumeration
//!
//! A cheap inventory query narrows the PnP entity list down to healthy devices
//! with audio-ish names, then each candidate gets its own battery query. The
//! queries run concurrently (bounded) and results are taken in completion
//! order. Only devices that reported a level make it into the result.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;

use super::battery::{BatteryProber, ProbeOutcome};
use super::device::{DeviceKind, DeviceRecord};
use super::filter::NameFilter;
use super::powershell::CommandRunner;
use crate::config::BluetoothConfig;
use crate::error::BluetoothError;
use crate::logging::PerformanceLogger;

/// One row of `Win32_PnPEntity` as emitted by `ConvertTo-Json`
#[derive(Debug, Deserialize)]
struct PnpEntity {
    #[serde(rename = "PNPDeviceID")]
    pnp_device_id: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
}

/// `ConvertTo-Json` collapses single-element arrays into a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<PnpEntity>),
    One(PnpEntity),
}

/// A device worth probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub instance_id: String,
    pub name: String,
}

/// PowerShell script listing candidate entities as JSON
pub fn inventory_script(filter: &NameFilter) -> String {
    format!(
        "ConvertTo-Json -Compress -InputObject @(Get-CimInstance -ClassName Win32_PnPEntity -Filter \"{}\" | Select-Object PNPDeviceID, Name)",
        filter.wql_condition()
    )
}

/// Parse the inventory JSON into candidates.
///
/// Rows without an instance id are dropped; a missing name falls back to the
/// instance id. Named rows must also pass the local filter.
pub fn parse_candidates(stdout: &str, filter: &NameFilter) -> Result<Vec<Candidate>, BluetoothError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entities = match serde_json::from_str::<OneOrMany>(trimmed)
        .map_err(|e| BluetoothError::InvalidData(e.to_string()))?
    {
        OneOrMany::Many(entities) => entities,
        OneOrMany::One(entity) => vec![entity],
    };

    let candidates = entities
        .into_iter()
        .filter_map(|entity| {
            let instance_id = entity.pnp_device_id.filter(|id| !id.trim().is_empty())?;
            match entity.name {
                Some(name) if filter.matches(&name) => Some(Candidate { instance_id, name }),
                Some(_) => None,
                None => Some(Candidate {
                    name: instance_id.clone(),
                    instance_id,
                }),
            }
        })
        .collect();

    Ok(candidates)
}

/// Keep the first record seen for every instance id
pub fn dedup_by_instance_id<I>(records: I) -> Vec<DeviceRecord>
where
    I: IntoIterator<Item = DeviceRecord>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.instance_id.clone()))
        .collect()
}

/// Lists paired devices that report a battery level
pub struct DeviceEnumerator {
    runner: Arc<dyn CommandRunner>,
    prober: BatteryProber,
    filter: NameFilter,
    max_concurrency: usize,
}

impl DeviceEnumerator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        prober: BatteryProber,
        filter: NameFilter,
        max_concurrency: usize,
    ) -> Self {
        Self {
            runner,
            prober,
            filter,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &BluetoothConfig) -> Self {
        let prober = BatteryProber::new(Arc::clone(&runner), config.probe_timeout);
        Self::new(
            runner,
            prober,
            NameFilter::new(config.name_patterns.iter().cloned()),
            config.max_concurrent_probes,
        )
    }

    /// Run the inventory query, bounded by the probe timeout
    pub async fn query_candidates(&self) -> Result<Vec<Candidate>, BluetoothError> {
        let perf = PerformanceLogger::new("DeviceEnumerator", "query_candidates");
        let limit = self.prober.timeout();
        let script = inventory_script(&self.filter);
        let output = tokio::time::timeout(limit, self.runner.run(&script))
            .await
            .map_err(|_| BluetoothError::TimedOut(limit))??;
        perf.finish();

        if !output.success() {
            return Err(BluetoothError::QueryFailed {
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_candidates(&output.stdout, &self.filter)
    }

    /// Enumerate battery-reporting devices. Never fails: an inventory error
    /// is logged and yields an empty list.
    pub async fn enumerate(&self) -> Vec<DeviceRecord> {
        let perf = PerformanceLogger::new("DeviceEnumerator", "enumerate");

        let candidates = match self.query_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("Device inventory query failed: {}", e);
                return Vec::new();
            }
        };
        log::info!("Inventory candidates count: {}", candidates.len());

        if candidates.is_empty() {
            return Vec::new();
        }

        let present = stream::iter(candidates)
            .map(|candidate| self.probe_candidate(candidate))
            .buffer_unordered(self.max_concurrency)
            .filter_map(|record| async move { record })
            .collect::<Vec<_>>()
            .await;

        let devices = dedup_by_instance_id(present);
        log::info!("Devices with battery found: {}", devices.len());
        perf.finish_with_context(&format!("{} devices", devices.len()));
        devices
    }

    async fn probe_candidate(&self, candidate: Candidate) -> Option<DeviceRecord> {
        match self.prober.probe(&candidate.instance_id, DeviceKind::Classic).await {
            ProbeOutcome::Present(level) => Some(
                DeviceRecord::new(candidate.name, candidate.instance_id, DeviceKind::Classic)
                    .with_battery(level),
            ),
            other => {
                log::debug!("Skipping {}: {}", candidate.instance_id, other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::CommandOutput;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::io;
    use std::time::Duration;

    /// Never answers within any sane timeout
    struct HangingRunner;

    #[async_trait]
    impl CommandRunner for HangingRunner {
        async fn run(&self, _script: &str) -> io::Result<CommandOutput> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CommandOutput::ok("[]"))
        }
    }

    fn filter() -> NameFilter {
        NameFilter::new(["Headphone", "Audio", "Hands-Free", "WH"])
    }

    #[test]
    fn test_parse_array() {
        let json = r#"[{"PNPDeviceID":"BTHENUM\\A","Name":"WH-1000XM4 Hands-Free"},
                       {"PNPDeviceID":"BTHENUM\\B","Name":"Realtek Audio"}]"#;
        let candidates = parse_candidates(json, &filter()).unwrap();
        assert_eq!(
            candidates,
            vec![
                Candidate { instance_id: "BTHENUM\\A".into(), name: "WH-1000XM4 Hands-Free".into() },
                Candidate { instance_id: "BTHENUM\\B".into(), name: "Realtek Audio".into() },
            ]
        );
    }

    #[test]
    fn test_parse_single_object_and_missing_fields() {
        let single = r#"{"PNPDeviceID":"BTHENUM\\A","Name":null}"#;
        let candidates = parse_candidates(single, &filter()).unwrap();
        assert_eq!(candidates[0].name, "BTHENUM\\A");

        let no_id = r#"[{"PNPDeviceID":null,"Name":"Headphones"}]"#;
        assert!(parse_candidates(no_id, &filter()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_applies_local_filter() {
        let json = r#"[{"PNPDeviceID":"USB\\1","Name":"USB Hub"}]"#;
        assert!(parse_candidates(json, &filter()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_candidates("  \r\n", &filter()).unwrap().is_empty());
        assert!(matches!(
            parse_candidates("Get-CimInstance : Access denied", &filter()),
            Err(BluetoothError::InvalidData(_))
        ));
    }

    #[test]
    fn test_dedup_keeps_first() {
        let records = vec![
            DeviceRecord::new("First", "ID-1", DeviceKind::Classic).with_battery(10),
            DeviceRecord::new("Other", "ID-2", DeviceKind::Classic).with_battery(20),
            DeviceRecord::new("Second", "ID-1", DeviceKind::Classic).with_battery(30),
        ];
        let unique = dedup_by_instance_id(records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "First");
        assert_eq!(unique[0].battery, Some(10));
        assert_eq!(unique[1].instance_id, "ID-2");
    }

    #[test]
    fn test_inventory_script_embeds_filter() {
        let script = inventory_script(&NameFilter::new(["Audio"]));
        assert!(script.contains("Win32_PnPEntity"));
        assert!(script.contains("Status='OK' AND (Name LIKE '%Audio%')"));
    }

    #[tokio::test]
    async fn test_hung_inventory_query_times_out() {
        let runner: Arc<dyn CommandRunner> = Arc::new(HangingRunner);
        let prober = BatteryProber::new(Arc::clone(&runner), Duration::from_millis(50));
        let enumerator = DeviceEnumerator::new(runner, prober, filter(), 4);

        assert!(matches!(
            enumerator.query_candidates().await,
            Err(BluetoothError::TimedOut(limit)) if limit == Duration::from_millis(50)
        ));
        assert!(enumerator.enumerate().await.is_empty());
    }
}
