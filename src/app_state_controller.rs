//! Tray controller: the application's state machine
//!
//! Owns the current selection, the last device list and the battery status.
//! Everything the user sees goes out through a [`TrayView`] and a
//! [`Notifier`]; the polling loop in [`crate::app`] drives it.

use std::time::Instant;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::bluetooth::{BatteryProber, DeviceKind, DeviceRecord, ProbeOutcome};
use crate::config::UiConfig;
use crate::ui::icon::{battery_color, IconColor};
use crate::ui::menu::MenuModel;
use crate::ui::notifier::Notifier;
use crate::ui::tray::TrayView;

pub const TITLE_UPDATING: &str = "TrayBTB --Updating devices--";
pub const TITLE_CHOOSE_DEVICE: &str = "TrayBTB --Choose device--";

pub const MSG_APP_STARTED: &str = "App started.\nPlease, update your device list and choose device!";
pub const MSG_CHOOSE_DEVICE: &str = "Choose device!";
pub const MSG_MULTIPLE_ERRORS: &str = "Multiple errors occurred. Please check device connection.";
pub const MSG_MAIN_LOOP_FAILED: &str = "Error in main loop. Application will be closed.";

/// Tooltip for a known battery level
pub fn battery_title(level: u8) -> String {
    format!("TrayBTB --{}%--", level)
}

/// Text of the low battery toast
pub fn low_battery_message(level: u8) -> String {
    format!("Low battery: {}%", level)
}

/// What the tray is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// The device list is being refreshed in the background
    Updating,
    /// Nothing to monitor
    NoDeviceSelected,
    /// Polling the selected device
    DeviceSelected,
}

/// Battery readings of the selected device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Last successful reading
    pub level: Option<u8>,
    /// Consecutive failed ticks
    pub error_count: u32,
    /// When `level` was read
    pub last_update: Option<Instant>,
}

/// Thresholds the controller works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub error_threshold: u32,
    pub low_battery_threshold: u8,
    pub repeat_low_battery_alert: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&UiConfig::default())
    }
}

impl From<&UiConfig> for ControllerSettings {
    fn from(config: &UiConfig) -> Self {
        Self {
            error_threshold: config.error_threshold,
            low_battery_threshold: config.low_battery_threshold,
            repeat_low_battery_alert: config.repeat_low_battery_alert,
        }
    }
}

/// Reasons a tick counts as failed
#[derive(Debug, Error)]
pub enum TickError {
    #[error("no battery reading from {device}: {outcome}")]
    NoReading { device: String, outcome: ProbeOutcome },

    #[error("device selected but no device stored")]
    MissingDevice,
}

/// Battery query for the selected device, run away from the controller
#[derive(Clone)]
pub struct ProbeRequest {
    prober: BatteryProber,
    instance_id: String,
    kind: DeviceKind,
}

impl ProbeRequest {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn run(self) -> ProbeReport {
        let outcome = self.prober.probe(&self.instance_id, self.kind).await;
        ProbeReport {
            instance_id: self.instance_id,
            outcome,
        }
    }
}

/// Outcome of a [`ProbeRequest`], tagged with the device it was meant for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub instance_id: String,
    pub outcome: ProbeOutcome,
}

/// The tray state machine
pub struct TrayController<V: TrayView, N: Notifier> {
    state: AppState,
    selected: Option<DeviceRecord>,
    devices: Vec<DeviceRecord>,
    battery: BatteryStatus,
    prober: BatteryProber,
    view: V,
    notifier: N,
    settings: ControllerSettings,
    low_battery_notified: bool,
    refresh_in_flight: bool,
}

impl<V: TrayView, N: Notifier> TrayController<V, N> {
    pub fn new(prober: BatteryProber, view: V, notifier: N, settings: ControllerSettings) -> Self {
        Self {
            state: AppState::NoDeviceSelected,
            selected: None,
            devices: Vec::new(),
            battery: BatteryStatus::default(),
            prober,
            view,
            notifier,
            settings,
            low_battery_notified: false,
            refresh_in_flight: false,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn selected(&self) -> Option<&DeviceRecord> {
        self.selected.as_ref()
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn battery_status(&self) -> &BatteryStatus {
        &self.battery
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Draw the initial frame and greet the user
    pub fn start(&mut self) {
        self.render_state();
        self.rebuild_menu();
        self.notifier.notify(MSG_APP_STARTED);
    }

    /// Enter `Updating`. Returns false when a refresh is already running, in
    /// which case the caller must not start another enumeration.
    pub fn begin_refresh(&mut self) -> bool {
        if self.refresh_in_flight {
            info!("Device refresh already running, ignoring request");
            return false;
        }
        info!("Scheduling background update for devices");
        self.refresh_in_flight = true;
        self.state = AppState::Updating;
        self.render_state();
        true
    }

    /// Apply the result of a background enumeration
    pub fn finish_refresh(&mut self, devices: Vec<DeviceRecord>) {
        info!("Device refresh finished with {} devices", devices.len());
        self.refresh_in_flight = false;
        self.devices = devices;
        self.notifier.notify(MSG_CHOOSE_DEVICE);

        self.state = if self.selected.is_some() {
            AppState::DeviceSelected
        } else {
            AppState::NoDeviceSelected
        };

        match self.state {
            AppState::DeviceSelected => {
                let level = self.battery.level.unwrap_or(0);
                self.view.set_icon(battery_color(level as f64));
            }
            _ => self.view.set_icon(IconColor::NO_DEVICE),
        }
        self.rebuild_menu();
    }

    /// Start monitoring `device`
    pub fn select_device(&mut self, device: DeviceRecord) {
        info!("State: Device chosen. It's {} ({})", device.name, device.instance_id);
        self.notifier.notify(&format!("Connected to {}!", device.name));

        self.selected = Some(device);
        self.state = AppState::DeviceSelected;
        self.battery = BatteryStatus::default();
        self.low_battery_notified = false;
        self.rebuild_menu();
    }

    /// Stop monitoring, whatever the current state
    pub fn disconnect(&mut self) {
        let name = self
            .selected
            .take()
            .map(|device| device.name)
            .unwrap_or_default();
        info!("Disconnect from {}", name);
        self.notifier
            .notify(&format!("Disconnected from {}.\nPlease choose device!", name));

        self.state = AppState::NoDeviceSelected;
        self.battery = BatteryStatus::default();
        self.low_battery_notified = false;
        self.view.set_icon(IconColor::NO_DEVICE);
        self.view.set_tooltip(TITLE_CHOOSE_DEVICE);
        self.rebuild_menu();
    }

    /// One pass of the polling loop, probing inline
    pub async fn tick(&mut self) {
        if let Some(request) = self.begin_tick() {
            let report = request.run().await;
            self.finish_tick(report);
        }
    }

    /// First half of a tick. Redraws the idle states, or hands back the
    /// battery query to run for the selected device.
    pub fn begin_tick(&mut self) -> Option<ProbeRequest> {
        match self.state {
            AppState::Updating | AppState::NoDeviceSelected => {
                self.render_state();
                None
            }
            AppState::DeviceSelected => match &self.selected {
                Some(device) => Some(ProbeRequest {
                    prober: self.prober.clone(),
                    instance_id: device.instance_id.clone(),
                    kind: device.kind,
                }),
                None => {
                    self.record_failure(TickError::MissingDevice);
                    None
                }
            },
        }
    }

    /// Second half of a tick. Reports for a device that is no longer being
    /// monitored are dropped.
    pub fn finish_tick(&mut self, report: ProbeReport) {
        let current = self.state == AppState::DeviceSelected
            && self
                .selected
                .as_ref()
                .map_or(false, |device| device.instance_id == report.instance_id);
        if !current {
            debug!("Dropping battery report for {}", report.instance_id);
            return;
        }

        match report.outcome {
            ProbeOutcome::Present(level) => self.apply_level(level),
            outcome => {
                let device = self
                    .selected
                    .as_ref()
                    .map(|device| device.name.clone())
                    .unwrap_or_default();
                match self.battery.last_update {
                    Some(at) => warn!(
                        "Failed to get battery level: {} (last reading {:?} ago)",
                        outcome,
                        at.elapsed()
                    ),
                    None => warn!("Failed to get battery level: {}", outcome),
                }
                self.record_failure(TickError::NoReading { device, outcome });
            }
        }
    }

    /// Tell the user the application is going down because of an error
    pub fn notify_fatal(&self) {
        self.notifier.notify(MSG_MAIN_LOOP_FAILED);
    }

    pub fn shutdown(&self) {
        info!("App exiting");
    }

    fn auto_disconnect(&mut self) {
        warn!(
            "Auto-disconnecting after {} consecutive errors",
            self.battery.error_count
        );
        self.disconnect();
    }

    fn record_failure(&mut self, e: TickError) {
        error!("State handling error: {}", e);
        self.battery.error_count += 1;

        if self.battery.error_count >= self.settings.error_threshold {
            self.notifier.notify(MSG_MULTIPLE_ERRORS);
            self.auto_disconnect();
        }
    }

    fn apply_level(&mut self, level: u8) {
        self.battery.level = Some(level);
        self.battery.error_count = 0;
        self.battery.last_update = Some(Instant::now());
        self.view.set_tooltip(&battery_title(level));
        self.view.set_icon(battery_color(level as f64));
        self.check_low_battery(level);
    }

    fn check_low_battery(&mut self, level: u8) {
        if level > self.settings.low_battery_threshold {
            self.low_battery_notified = false;
            return;
        }
        if self.settings.repeat_low_battery_alert || !self.low_battery_notified {
            self.notifier.notify(&low_battery_message(level));
            self.low_battery_notified = true;
        }
    }

    /// Icon and tooltip for the states that do not depend on a reading
    fn render_state(&self) {
        match self.state {
            AppState::Updating => {
                self.view.set_icon(IconColor::UPDATING);
                self.view.set_tooltip(TITLE_UPDATING);
            }
            AppState::NoDeviceSelected => {
                self.view.set_tooltip(TITLE_CHOOSE_DEVICE);
                self.view.set_icon(IconColor::NO_DEVICE);
            }
            AppState::DeviceSelected => {}
        }
    }

    fn rebuild_menu(&self) {
        self.view
            .set_menu(MenuModel::build(&self.devices, self.selected.is_some()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{CommandOutput, CommandRunner, DeviceKind};
    use crate::ui::notifier::MockNotifier;
    use crate::ui::tray::TrayHandle;
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays battery outputs in order; an exhausted script fails the query
    struct ScriptedRunner(Mutex<VecDeque<CommandOutput>>);

    impl ScriptedRunner {
        fn new(outputs: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(outputs.into())))
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, _script: &str) -> io::Result<CommandOutput> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| CommandOutput::failed(1, "no such property")))
        }
    }

    fn controller(
        outputs: Vec<CommandOutput>,
        notifier: MockNotifier,
    ) -> TrayController<TrayHandle, MockNotifier> {
        let prober = BatteryProber::new(ScriptedRunner::new(outputs), Duration::from_millis(200));
        TrayController::new(prober, TrayHandle::new(), notifier, ControllerSettings::default())
    }

    fn headphones() -> DeviceRecord {
        DeviceRecord::new("WH-1000XM4", "BTHENUM\\A", DeviceKind::Classic)
    }

    fn permissive_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().return_const(());
        notifier
    }

    #[test]
    fn test_initial_state() {
        let controller = controller(vec![], MockNotifier::new());
        assert_eq!(controller.state(), AppState::NoDeviceSelected);
        assert!(controller.selected().is_none());
        assert_eq!(controller.battery_status(), &BatteryStatus::default());
    }

    #[test]
    fn test_start_shows_greeting() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .with(eq(MSG_APP_STARTED))
            .times(1)
            .return_const(());
        let mut controller = controller(vec![], notifier);
        controller.start();
        assert_eq!(controller.view().tooltip(), TITLE_CHOOSE_DEVICE);
        assert_eq!(controller.view().icon(), Some(IconColor::NO_DEVICE));
    }

    #[tokio::test]
    async fn test_successful_tick_updates_tooltip_and_icon() {
        let mut controller = controller(vec![CommandOutput::ok("64\r\n")], permissive_notifier());
        controller.select_device(headphones());
        controller.tick().await;

        assert_eq!(controller.battery_status().level, Some(64));
        assert_eq!(controller.battery_status().error_count, 0);
        assert!(controller.battery_status().last_update.is_some());
        assert_eq!(controller.view().tooltip(), "TrayBTB --64%--");
        assert_eq!(controller.view().icon(), Some(battery_color(64.0)));
    }

    #[test]
    fn test_idle_states_do_not_probe() {
        let mut controller = controller(vec![], permissive_notifier());
        assert!(controller.begin_tick().is_none());
        assert_eq!(controller.view().tooltip(), TITLE_CHOOSE_DEVICE);

        controller.begin_refresh();
        assert!(controller.begin_tick().is_none());
        assert_eq!(controller.view().tooltip(), TITLE_UPDATING);
    }

    #[tokio::test]
    async fn test_report_for_previous_device_is_dropped() {
        let mut controller = controller(vec![CommandOutput::ok("40")], permissive_notifier());
        controller.select_device(headphones());
        let request = controller.begin_tick().expect("selected device must be probed");
        assert_eq!(request.instance_id(), "BTHENUM\\A");

        controller.disconnect();
        controller.select_device(DeviceRecord::new("AirPods", "BTHENUM\\B", DeviceKind::Classic));
        controller.finish_tick(request.run().await);

        assert_eq!(controller.battery_status(), &BatteryStatus::default());
        assert_eq!(controller.state(), AppState::DeviceSelected);
    }

    #[tokio::test]
    async fn test_ten_failures_disconnect_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|message| message.starts_with("Connected to"))
            .times(1)
            .return_const(());
        notifier
            .expect_notify()
            .with(eq(MSG_MULTIPLE_ERRORS))
            .times(1)
            .return_const(());
        notifier
            .expect_notify()
            .withf(|message| message.starts_with("Disconnected from WH-1000XM4"))
            .times(1)
            .return_const(());

        let mut controller = controller(vec![], notifier);
        controller.select_device(headphones());

        for _ in 0..9 {
            controller.tick().await;
        }
        assert_eq!(controller.state(), AppState::DeviceSelected);
        assert_eq!(controller.battery_status().error_count, 9);

        controller.tick().await;
        assert_eq!(controller.state(), AppState::NoDeviceSelected);
        assert_eq!(controller.battery_status().error_count, 0);
        assert!(controller.selected().is_none());

        // No device any more: further ticks cannot fail
        controller.tick().await;
        assert_eq!(controller.battery_status().error_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_error_counter() {
        let mut outputs = vec![CommandOutput::failed(1, ""); 9];
        outputs.push(CommandOutput::ok("80"));
        outputs.extend(vec![CommandOutput::failed(1, ""); 9]);

        let mut controller = controller(outputs, permissive_notifier());
        controller.select_device(headphones());

        for _ in 0..9 {
            controller.tick().await;
        }
        controller.tick().await;
        assert_eq!(controller.battery_status().error_count, 0);

        for _ in 0..9 {
            controller.tick().await;
        }
        assert_eq!(controller.state(), AppState::DeviceSelected);
        assert_eq!(controller.battery_status().error_count, 9);
    }

    #[tokio::test]
    async fn test_low_energy_selection_counts_as_failure() {
        let mut controller = controller(vec![CommandOutput::ok("50")], permissive_notifier());
        controller.select_device(DeviceRecord::new("Buds", "BTHLE\\X", DeviceKind::LowEnergy));
        controller.tick().await;
        assert_eq!(controller.battery_status().error_count, 1);
        assert_eq!(controller.battery_status().level, None);
    }

    #[tokio::test]
    async fn test_low_battery_alert_once_per_drop() {
        let outputs = ["25", "18", "15", "12", "40", "19"]
            .iter()
            .map(|level| CommandOutput::ok(*level))
            .collect();

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|message| message.starts_with("Connected to"))
            .return_const(());
        notifier
            .expect_notify()
            .withf(|message| message == low_battery_message(18))
            .times(1)
            .return_const(());
        notifier
            .expect_notify()
            .withf(|message| message == low_battery_message(19))
            .times(1)
            .return_const(());

        let mut controller = controller(outputs, notifier);
        controller.select_device(headphones());
        for _ in 0..6 {
            controller.tick().await;
        }
        assert_eq!(controller.battery_status().level, Some(19));
    }

    #[tokio::test]
    async fn test_repeat_low_battery_alert_setting() {
        let outputs = vec![CommandOutput::ok("10"), CommandOutput::ok("10")];
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|message| message.starts_with("Connected to"))
            .return_const(());
        notifier
            .expect_notify()
            .withf(|message| message == low_battery_message(10))
            .times(2)
            .return_const(());

        let prober = BatteryProber::new(ScriptedRunner::new(outputs), Duration::from_millis(200));
        let settings = ControllerSettings {
            repeat_low_battery_alert: true,
            ..ControllerSettings::default()
        };
        let mut controller = TrayController::new(prober, TrayHandle::new(), notifier, settings);
        controller.select_device(headphones());
        controller.tick().await;
        controller.tick().await;
    }

    #[test]
    fn test_refresh_cycle_without_selection() {
        let mut controller = controller(vec![], permissive_notifier());

        assert!(controller.begin_refresh());
        assert_eq!(controller.state(), AppState::Updating);
        assert_eq!(controller.view().tooltip(), TITLE_UPDATING);
        assert_eq!(controller.view().icon(), Some(IconColor::UPDATING));
        assert!(!controller.begin_refresh(), "second refresh must be ignored");

        controller.finish_refresh(vec![headphones().with_battery(70)]);
        assert_eq!(controller.state(), AppState::NoDeviceSelected);
        assert!(!controller.is_refreshing());
        assert_eq!(controller.devices().len(), 1);
        assert_eq!(controller.view().icon(), Some(IconColor::NO_DEVICE));
    }

    #[test]
    fn test_refresh_keeps_selection() {
        let mut controller = controller(vec![], permissive_notifier());
        controller.select_device(headphones());
        controller.begin_refresh();
        controller.finish_refresh(Vec::new());
        assert_eq!(controller.state(), AppState::DeviceSelected);
        assert_eq!(controller.selected(), Some(&headphones()));
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut controller = controller(vec![], permissive_notifier());

        controller.disconnect();
        assert_eq!(controller.state(), AppState::NoDeviceSelected);

        controller.select_device(headphones());
        controller.begin_refresh();
        controller.disconnect();
        assert_eq!(controller.state(), AppState::NoDeviceSelected);
        assert!(controller.selected().is_none());
        assert_eq!(controller.view().tooltip(), TITLE_CHOOSE_DEVICE);
    }
}
