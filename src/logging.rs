//! File logging for TrayBTB
//!
//! Every run appends to its own file named after the start time, e.g.
//! `logs/TrayBTB_2024-05-01_18-42-07.log`. Console mirroring is optional and
//! mostly useful when running from a terminal.

use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use crate::config::LogLevel;

/// Timestamp format for log entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp format embedded in log file names
const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Prefix of every log file name
const LOG_FILE_PREFIX: &str = "TrayBTB_";

/// Global initialization guard
static INIT_LOGGER: Once = Once::new();

/// Logger writing plain lines to the run's file and coloured lines to stderr
pub struct TrayLogger {
    /// File output for logs
    file: Option<Mutex<File>>,
    /// Log level filter
    level: LevelFilter,
    /// Whether to output to stderr
    console_output: bool,
}

impl log::Log for TrayLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let module = record.module_path().unwrap_or("<unknown>");
        let file_info = format!(
            "{}:{}",
            record.file().unwrap_or("<unknown>"),
            record.line().unwrap_or(0)
        );

        if self.console_output {
            let level_str = match record.level() {
                Level::Error => "\x1B[31mERROR\x1B[0m",
                Level::Warn => "\x1B[33mWARN \x1B[0m",
                Level::Info => "\x1B[32mINFO \x1B[0m",
                Level::Debug => "\x1B[36mDEBUG\x1B[0m",
                Level::Trace => "\x1B[90mTRACE\x1B[0m",
            };
            let console_entry = format!(
                "[{}] {} [{}] [{}] {}\n",
                timestamp,
                level_str,
                module,
                file_info,
                record.args()
            );
            let _ = io::stderr().write_all(console_entry.as_bytes());
        }

        if let Some(file) = &self.file {
            let file_entry = format!(
                "[{}] {} [{}] [{}] {}\n",
                timestamp,
                record.level(),
                module,
                file_info,
                record.args()
            );
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(file_entry.as_bytes());
                let _ = file.flush();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Convert the configured level into a `log` filter
pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Path of the log file for a run started at `started`
pub fn log_file_path(log_dir: &Path, started: DateTime<Local>) -> PathBuf {
    log_dir.join(format!(
        "{}{}.log",
        LOG_FILE_PREFIX,
        started.format(FILE_STAMP_FORMAT)
    ))
}

/// Open (append mode) a log file, creating its directory when needed
fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory: {}", e))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file: {}", e))
}

/// Configure logging with the specified level and optionally a log file.
///
/// Only the first call installs a logger; later calls are no-ops.
pub fn configure_logging(
    level: LogLevel,
    log_file: Option<PathBuf>,
    console_output: bool,
) -> Result<(), String> {
    let mut result = Ok(());

    INIT_LOGGER.call_once(|| {
        let filter = level_filter(level);

        let file = match log_file.as_deref().map(open_log_file) {
            Some(Ok(file)) => Some(Mutex::new(file)),
            Some(Err(e)) => {
                result = Err(e);
                return;
            }
            None => None,
        };

        let logger = Box::new(TrayLogger {
            file,
            level: filter,
            console_output,
        });

        if let Err(e) = log::set_boxed_logger(logger) {
            result = Err(format!("Failed to set logger: {}", e));
            return;
        }
        log::set_max_level(filter);

        log::info!("Logging initialized at level: {}", level);
        if let Some(path) = &log_file {
            log::info!("Log file: {}", path.display());
        }
    });

    result
}

/// Helper for performance logging
pub struct PerformanceLogger {
    /// Operation being timed
    operation: String,
    /// Component performing the operation
    component: String,
    /// Start time
    start_time: std::time::Instant,
}

impl PerformanceLogger {
    /// Start timing an operation
    pub fn new<S: Into<String>>(component: S, operation: S) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Finish timing and log result
    pub fn finish(self) {
        log::debug!(
            "[{}::{}] Operation completed in {:?}",
            self.component,
            self.operation,
            self.start_time.elapsed()
        );
    }

    /// Finish timing with additional context
    pub fn finish_with_context(self, context: &str) {
        log::debug!(
            "[{}::{}] Operation '{}' completed in {:?}",
            self.component,
            self.operation,
            context,
            self.start_time.elapsed()
        );
    }
}
