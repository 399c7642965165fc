//! External process seam for OS device queries
//!
//! Every inventory and property query runs as a PowerShell child process whose
//! stdout and exit code are captured. The [`CommandRunner`] trait lets tests
//! script those results.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::config::BluetoothConfig;

/// Hide the console window of child processes
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Windows PowerShell writes redirected output in the OEM code page unless told otherwise
const UTF8_OUTPUT_PREAMBLE: &str = "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; ";

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one PowerShell script and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, script: &str) -> io::Result<CommandOutput>;
}

/// Quote a value as a PowerShell single-quoted string literal
pub fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Arguments passed to the shell for one script, output forced to UTF-8
pub fn command_args(script: &str) -> [String; 4] {
    [
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-Command".to_string(),
        format!("{}{}", UTF8_OUTPUT_PREAMBLE, script),
    ]
}

/// Real runner spawning `pwsh` / `powershell`
#[derive(Debug, Clone)]
pub struct PowerShell {
    program: PathBuf,
}

impl PowerShell {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Prefer PowerShell 7 when it is on PATH, fall back to Windows PowerShell
    pub fn detect() -> Self {
        let program = find_on_path("pwsh").unwrap_or_else(|| PathBuf::from("powershell"));
        log::debug!("Using PowerShell at {}", program.display());
        Self::new(program)
    }

    pub fn from_config(config: &BluetoothConfig) -> Self {
        match &config.powershell_path {
            Some(path) => Self::new(path.clone()),
            None => Self::detect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl CommandRunner for PowerShell {
    async fn run(&self, script: &str) -> io::Result<CommandOutput> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(command_args(script))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let output = command.output().await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locate an executable in the directories listed in PATH
fn find_on_path(name: &str) -> Option<PathBuf> {
    let file_name = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}
