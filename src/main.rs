#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use anyhow::Context;
use chrono::Local;

use traybtb::config::AppConfig;
use traybtb::logging::{configure_logging, log_file_path};
use traybtb::App;

fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();

    let started = Local::now();
    let config = AppConfig::load().context("Failed to load configuration")?;

    let log_file = log_file_path(&config.system.log_dir, started);
    configure_logging(config.system.log_level, Some(log_file), config.system.console_log)
        .map_err(anyhow::Error::msg)
        .context("Failed to initialise logging")?;

    App::new(config).run().context("TrayBTB stopped with an error")?;
    Ok(())
}
