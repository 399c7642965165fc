//! TrayBTB: battery level of paired Bluetooth headsets in the system tray

pub mod app;
pub mod app_state_controller;
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod logging;
pub mod ui;

pub use app::App;
pub use app_state_controller::{AppState, TrayController};
pub use config::AppConfig;
pub use error::{AppError, Result};
