//! Child-process supervision for automation runs.
//!
//! The control plane never drives a browser itself; it spawns `jobscout-run <mode>`
//! with output appended to the run log and escalates on stop:
//! cooperative signal → SIGTERM → kill.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const ENV_RUN_BINARY: &str = "JOBSCOUT_RUN_BIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Search,
    Apply,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Search => "search",
            RunMode::Apply => "apply",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "search" => Some(RunMode::Search),
            "apply" => Some(RunMode::Apply),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("opening run log {path}: {source}")]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("spawning {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Option<u32>),
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// The run honored the stop signal within the grace period.
    Exited,
    Terminated,
    Killed,
}

/// Start, observe and stop the single automation run.
#[async_trait]
pub trait RunSupervisor: Send + Sync {
    async fn start(&self, mode: RunMode) -> Result<StartOutcome, SupervisorError>;

    async fn is_alive(&self) -> bool;

    /// Forget a tracked child that has already exited. Returns `true` if one was reaped.
    async fn reap(&self) -> bool;

    /// Wait for the tracked child to go away, escalating after each timeout.
    /// The caller raises the cooperative stop signal first.
    async fn stop(&self) -> StopOutcome;
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: PathBuf,
    /// Arguments placed before the mode argument.
    pub leading_args: Vec<String>,
    pub log_path: PathBuf,
    /// How long the run gets to notice the stop signal.
    pub grace: Duration,
    pub term_wait: Duration,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            log_path: log_path.into(),
            grace: Duration::from_secs(30),
            term_wait: Duration::from_secs(5),
        }
    }
}

/// `JOBSCOUT_RUN_BIN`, else `jobscout-run` next to the current executable, else `$PATH`.
pub fn default_run_binary() -> PathBuf {
    if let Ok(explicit) = std::env::var(ENV_RUN_BINARY) {
        if !explicit.trim().is_empty() {
            return PathBuf::from(explicit.trim());
        }
    }
    let name = format!("jobscout-run{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    child: Mutex<Option<Child>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    fn open_log(&self) -> Result<std::fs::File, SupervisorError> {
        let path = &self.config.log_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SupervisorError::Log {
                path: path.clone(),
                source,
            })
    }
}

fn still_running(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(None) => true,
        Ok(Some(_)) => false,
        Err(e) => {
            warn!("supervisor: try_wait failed: {}", e);
            false
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!("supervisor: SIGTERM to {} failed: {}", pid, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

#[async_trait]
impl RunSupervisor for ProcessSupervisor {
    async fn start(&self, mode: RunMode) -> Result<StartOutcome, SupervisorError> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if still_running(child) {
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let log = self.open_log()?;
        let log_err = log.try_clone().map_err(|source| SupervisorError::Log {
            path: self.config.log_path.clone(),
            source,
        })?;

        let child = Command::new(&self.config.program)
            .args(&self.config.leading_args)
            .arg(mode.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let pid = child.id();
        info!(
            "supervisor: started {} run (pid {:?}), output in {}",
            mode,
            pid,
            self.config.log_path.display()
        );
        *guard = Some(child);
        Ok(StartOutcome::Started(pid))
    }

    async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        guard.as_mut().map(still_running).unwrap_or(false)
    }

    async fn reap(&self) -> bool {
        let mut guard = self.child.lock().await;
        let exited = guard.as_mut().map(|child| !still_running(child)).unwrap_or(false);
        if exited {
            *guard = None;
        }
        exited
    }

    async fn stop(&self) -> StopOutcome {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return StopOutcome::NotRunning;
        };
        if !still_running(&mut child) {
            return StopOutcome::NotRunning;
        }

        if tokio::time::timeout(self.config.grace, child.wait()).await.is_ok() {
            info!("supervisor: run exited on the stop signal");
            return StopOutcome::Exited;
        }

        warn!(
            "supervisor: run ignored the stop signal for {}s, terminating",
            self.config.grace.as_secs()
        );
        if send_sigterm(&child)
            && tokio::time::timeout(self.config.term_wait, child.wait())
                .await
                .is_ok()
        {
            return StopOutcome::Terminated;
        }

        warn!("supervisor: killing run");
        if let Err(e) = child.kill().await {
            warn!("supervisor: kill failed: {}", e);
        }
        StopOutcome::Killed
    }
}
