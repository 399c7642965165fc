//! Application entry point and main loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;

use crate::app_state_controller::{ControllerSettings, TrayController};
use crate::bluetooth::{BatteryProber, CommandRunner, DeviceEnumerator, PowerShell};
use crate::config::AppConfig;
use crate::error::{AppError, Result, TrayError};
use crate::ui::menu::MenuAction;
use crate::ui::notifier::{Notifier, ToastNotifier};
use crate::ui::tray::{TrayHandle, TrayView};

/// Main application struct
pub struct App {
    config: AppConfig,
    exit: Arc<AtomicBool>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            exit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the tray thread and the main loop once set
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exit)
    }

    /// Run until the user picks Exit, Ctrl+C arrives or the loop fails
    pub fn run(self) -> Result<()> {
        log::info!("Starting TrayBTB");

        let exit = Arc::clone(&self.exit);
        if let Err(e) = ctrlc::set_handler(move || exit.store(true, Ordering::SeqCst)) {
            log::warn!("Failed to install Ctrl+C handler: {}", e);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let runner: Arc<dyn CommandRunner> = Arc::new(PowerShell::from_config(&self.config.bluetooth));
        let enumerator = Arc::new(DeviceEnumerator::from_config(
            Arc::clone(&runner),
            &self.config.bluetooth,
        ));
        let prober = BatteryProber::new(runner, self.config.bluetooth.probe_timeout);

        let view = TrayHandle::new();
        let mut controller = TrayController::new(
            prober,
            view.clone(),
            ToastNotifier::new(&self.config.ui),
            ControllerSettings::from(&self.config.ui),
        );

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let ui_thread = spawn_ui(view, self.config.ui.menu_debounce, action_tx, self.exit_flag())?;
        controller.start();

        let result = runtime.block_on(main_loop(
            &mut controller,
            enumerator,
            action_rx,
            &self.exit,
            self.config.ui.poll_interval,
        ));

        self.exit.store(true, Ordering::SeqCst);
        if let Err(e) = &result {
            log::error!("Main loop stopped: {}", e);
            controller.notify_fatal();
        }
        if ui_thread.join().is_err() {
            log::error!("Tray thread panicked");
        }
        controller.shutdown();
        result
    }
}

#[cfg(windows)]
fn spawn_ui(
    view: TrayHandle,
    debounce: Duration,
    actions: UnboundedSender<MenuAction>,
    exit: Arc<AtomicBool>,
) -> std::result::Result<thread::JoinHandle<()>, TrayError> {
    crate::ui::tray::spawn_tray_thread(view, debounce, actions, exit)
}

#[cfg(not(windows))]
fn spawn_ui(
    _view: TrayHandle,
    _debounce: Duration,
    _actions: UnboundedSender<MenuAction>,
    _exit: Arc<AtomicBool>,
) -> std::result::Result<thread::JoinHandle<()>, TrayError> {
    Err(TrayError::UnsupportedPlatform)
}

/// Drive the controller until `exit` is set.
///
/// Ticks run on `poll_interval`. Battery queries and refreshes run as
/// separate tasks whose results come back through channels, so menu actions
/// and the exit flag are served while a query is still running. At most one
/// battery query is in flight; ticks that arrive meanwhile are skipped.
pub async fn main_loop<V, N>(
    controller: &mut TrayController<V, N>,
    enumerator: Arc<DeviceEnumerator>,
    mut actions: UnboundedReceiver<MenuAction>,
    exit: &AtomicBool,
    poll_interval: Duration,
) -> Result<()>
where
    V: TrayView,
    N: Notifier,
{
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
    let mut probe_in_flight = false;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !exit.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticker.tick() => {
                // Ticks keep the exit flag checked even while a query runs
                if !probe_in_flight {
                    if let Some(request) = controller.begin_tick() {
                        probe_in_flight = true;
                        let probe_tx = probe_tx.clone();
                        tokio::spawn(async move {
                            let _ = probe_tx.send(request.run().await);
                        });
                    }
                }
            }
            Some(report) = probe_rx.recv() => {
                probe_in_flight = false;
                controller.finish_tick(report);
            }
            Some(devices) = done_rx.recv() => controller.finish_refresh(devices),
            action = actions.recv() => match action {
                Some(MenuAction::Refresh) => {
                    if controller.begin_refresh() {
                        let enumerator = Arc::clone(&enumerator);
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            let devices = enumerator.enumerate().await;
                            // The loop may already be gone on shutdown
                            let _ = done_tx.send(devices);
                        });
                    }
                }
                Some(MenuAction::Select(device)) => controller.select_device(device),
                Some(MenuAction::Disconnect) => controller.disconnect(),
                Some(MenuAction::Exit) => {
                    log::info!("Exit requested from tray menu");
                    exit.store(true, Ordering::SeqCst);
                }
                None if exit.load(Ordering::SeqCst) => break,
                None => return Err(AppError::MainLoop("tray event channel closed".to_string())),
            },
        }
    }

    Ok(())
}
