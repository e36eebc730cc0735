//! Service supervisor
//!
//! Manages a single daemon through a PID file:
//!
//! ```text
//!   start ──► claim PID file ──► spawn ──► grace sleep ──► alive? ──► commit PID
//!                 │                                          │
//!                 └── live owner: already started (1)        └── dead: start failed (2)
//!
//!   stop  ──► read PID ──► SIGTERM ──► wait (stop_timeout) ──► SIGKILL on timeout
//!                                 └──► PID file removed in every case
//! ```
//!
//! Exit codes follow the init-script convention: 0 ok, 1 already started /
//! already stopped / not running, 2 start failed, 3 usage, 4 I/O or config.

mod pidfile;
mod process;

pub use pidfile::{PidClaim, PidFile, PidFileError};
pub use process::{cmdline_contains, find_by_arg, is_alive, load_env_file, SpawnError};

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::config::SupervisorConfig;

pub const EXIT_OK: i32 = 0;
pub const EXIT_NOOP: i32 = 1;
pub const EXIT_START_FAILED: i32 = 2;
pub const EXIT_USAGE: i32 = 3;
pub const EXIT_FAILURE: i32 = 4;

/// Poll interval while waiting for a stopped daemon to exit
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("{name} already started (PID {pid})")]
    AlreadyRunning { name: String, pid: u32 },

    #[error("{0} already stopped")]
    AlreadyStopped(String),

    #[error("Failed to signal {name} (PID {pid}): {errno}")]
    Signal { name: String, pid: u32, errno: Errno },

    #[error("PID {pid} does not belong to {name}")]
    ForeignPid { name: String, pid: u32 },

    #[error("Failed to start {name}: {reason}")]
    StartFailed { name: String, reason: String },

    #[error("Failed to start {name}: {source}")]
    Spawn { name: String, source: SpawnError },

    #[error(transparent)]
    PidFile(#[from] PidFileError),
}

impl SupervisorError {
    /// Init-script exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning { .. }
            | Self::AlreadyStopped(_)
            | Self::Signal { .. }
            | Self::ForeignPid { .. }
            | Self::PidFile(PidFileError::Invalid { .. }) => EXIT_NOOP,
            Self::StartFailed { .. } | Self::Spawn { .. } => EXIT_START_FAILED,
            Self::PidFile(_) => EXIT_FAILURE,
        }
    }
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// SIGTERM sent; exit not awaited (stop_timeout = 0)
    Signaled,
    /// Process exited after SIGTERM
    Exited,
    /// Process ignored SIGTERM for stop_timeout and was killed
    Killed,
}

/// Result of a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Processes whose command line contains the daemon program
    pub running: Vec<u32>,
    /// PID recorded in the PID file, if any
    pub recorded: Option<u32>,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_running() {
            EXIT_OK
        } else {
            EXIT_NOOP
        }
    }

    /// Recorded PID that no longer names a running daemon
    pub fn is_stale(&self) -> bool {
        self.recorded.is_some_and(|pid| !self.running.contains(&pid))
    }
}

/// Lifecycle manager for the configured daemon
pub struct Supervisor {
    config: SupervisorConfig,
    pid_file: PidFile,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let pid_file = PidFile::new(config.pid_file.clone());
        Self { config, pid_file }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    fn name(&self) -> String {
        self.config.name.clone()
    }

    /// Start the daemon, returning its PID
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        let program = self.config.program.as_os_str();
        let claim = self.pid_file.claim(program).map_err(|e| match e {
            PidFileError::Held { pid, .. } => SupervisorError::AlreadyRunning {
                name: self.name(),
                pid,
            },
            other => SupervisorError::PidFile(other),
        })?;

        let log = self.open_log("start").map_err(|source| SupervisorError::Spawn {
            name: self.name(),
            source,
        })?;
        let env = self.override_env();

        let mut child = process::spawn_daemon(&self.config, log, &env).map_err(|source| {
            SupervisorError::Spawn {
                name: self.name(),
                source,
            }
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::StartFailed {
            name: self.name(),
            reason: "process exited before its PID was known".to_string(),
        })?;
        log::debug!(
            "Spawned {} (PID {}), probing in {:?}",
            self.config.name,
            pid,
            self.config.start_grace
        );

        tokio::time::sleep(self.config.start_grace).await;

        // Our own child stays a zombie until reaped, so check it directly first
        let early_exit = child.try_wait().ok().flatten();
        if let Some(status) = early_exit {
            return Err(SupervisorError::StartFailed {
                name: self.name(),
                reason: format!("exited during startup ({})", status),
            });
        }
        if !process::is_alive(pid) {
            return Err(SupervisorError::StartFailed {
                name: self.name(),
                reason: "not running after startup".to_string(),
            });
        }

        if let Err(e) = claim.commit(pid) {
            log::error!("Could not record PID {}, terminating {}", pid, self.config.name);
            let _ = process::send_signal(pid, Signal::SIGTERM);
            return Err(e.into());
        }

        log::info!("Started {} (PID {})", self.config.name, pid);
        Ok(pid)
    }

    /// Stop the daemon recorded in the PID file.
    ///
    /// The PID file is removed whenever a PID was read, whether or not the
    /// signal reached a process.
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let pid = match self.pid_file.read() {
            Ok(Some(pid)) => pid,
            Ok(None) => return Err(SupervisorError::AlreadyStopped(self.name())),
            Err(e @ PidFileError::Invalid { .. }) => {
                self.discard_pid_file();
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let result = if process::is_alive(pid)
            && !process::cmdline_contains(pid, self.config.program.as_os_str())
            && process::cmdline(pid).is_some()
        {
            // PID recycled by an unrelated process
            Err(SupervisorError::ForeignPid {
                name: self.name(),
                pid,
            })
        } else {
            log::info!("Stopping {} (PID {})", self.config.name, pid);
            match process::send_signal(pid, Signal::SIGTERM) {
                Ok(()) => Ok(self.wait_for_exit(pid).await),
                Err(errno) => Err(SupervisorError::Signal {
                    name: self.name(),
                    pid,
                    errno,
                }),
            }
        };

        self.discard_pid_file();
        if let Err(e) = self.open_log("stop") {
            log::warn!("{}", e);
        }

        if let Ok(outcome) = &result {
            log::info!("Stopped {} ({:?})", self.config.name, outcome);
        }
        result
    }

    /// Report whether the daemon is in the process table.
    ///
    /// The PID file is informational only; an unreadable one is logged and
    /// reported as absent.
    pub fn status(&self) -> ServiceStatus {
        let running = process::find_by_arg(self.config.program.as_os_str());
        let recorded = self.pid_file.read().unwrap_or_else(|e| {
            log::warn!("{}", e);
            None
        });
        ServiceStatus { running, recorded }
    }

    /// Stop, then start if stop ended with exit code 0 or 1
    pub async fn restart(&self) -> Result<u32, SupervisorError> {
        match self.stop().await {
            Ok(_) => {}
            Err(e) if e.exit_code() == EXIT_NOOP => {
                log::info!("{}", e);
            }
            Err(e) => {
                log::error!("Restart of {} aborted: {}", self.config.name, e);
                return Err(e);
            }
        }
        self.start().await
    }

    async fn wait_for_exit(&self, pid: u32) -> StopOutcome {
        let timeout = self.config.stop_timeout;
        if timeout.is_zero() {
            return StopOutcome::Signaled;
        }

        let exited = tokio::time::timeout(timeout, async {
            while process::is_alive(pid) {
                tokio::time::sleep(STOP_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        if exited {
            return StopOutcome::Exited;
        }

        log::warn!(
            "Timeout stopping {} (PID {}), sending SIGKILL",
            self.config.name,
            pid
        );
        if let Err(e) = process::send_signal(pid, Signal::SIGKILL) {
            log::debug!("SIGKILL to {} failed: {}", pid, e);
        }
        StopOutcome::Killed
    }

    fn discard_pid_file(&self) {
        if let Err(e) = self.pid_file.remove() {
            log::warn!("{}", e);
        }
    }

    /// Open the log file for appending and write a timestamped section marker
    fn open_log(&self, event: &str) -> Result<File, SpawnError> {
        let path = &self.config.log_file;
        let to_error = |source: std::io::Error| SpawnError::Log {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(to_error)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(to_error)?;
        writeln!(file, "{}", section_marker(&self.config.name, event)).map_err(to_error)?;
        Ok(file)
    }

    /// Variables from the override file; a missing file yields none
    pub fn override_env(&self) -> HashMap<String, String> {
        let Some(path) = &self.config.env_file else {
            return HashMap::new();
        };
        match process::load_env_file(path) {
            Ok(vars) => {
                log::debug!("Loaded {} variables from {}", vars.len(), path.display());
                vars
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                log::warn!("Ignoring {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }
}

/// Log file section marker, e.g. `===== pjc-mc start 2024-05-01 10:00:00 +02:00 =====`
pub fn section_marker(name: &str, event: &str) -> String {
    format!(
        "===== {} {} {} =====",
        name,
        event,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S %:z")
    )
}
