//! Generic lifecycle supervision of one external OS process.
//!
//! [`ProcessSupervisor`] owns at most one live child at a time. Starting a
//! process spawns a monitor task that owns the child, waits for it to exit,
//! and then records the outcome and fires a one-shot completion token. Stop
//! asks the monitor to kill the child and waits on that token for a bounded
//! time. "Did start succeed" and "is it still alive" are therefore separate
//! questions; callers ask the latter with [`ProcessSupervisor::is_running`].

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default bound on how long Stop waits for the killed process to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a child's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Share the host's standard streams.
    Inherit,
    /// Discard all output.
    Null,
    /// Append both streams to a log file, created if missing.
    AppendFile(PathBuf),
}

/// Everything needed to launch one process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    /// Added on top of the inherited host environment.
    pub env: Vec<(OsString, OsString)>,
    pub output: OutputTarget,
    /// Kill the process when this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl ProcessSpec {
    /// Spec for `program` with no arguments, inherited streams and no cancellation.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            output: OutputTarget::Inherit,
            cancel: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn log_path(&self) -> Option<&PathBuf> {
        match self.output {
            OutputTarget::AppendFile(ref path) => Some(path),
            _ => None,
        }
    }

    fn command(&self) -> std::io::Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(false);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        match self.output {
            OutputTarget::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputTarget::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputTarget::AppendFile(ref path) => {
                let log = OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stdout(log.try_clone()?).stderr(log);
            }
        }

        Ok(cmd)
    }
}

/// Supervisor-level view of the owned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// Nothing was ever started.
    Idle,
    Running { pid: u32 },
    /// Kill sent, waiting (bounded) for the exit.
    Stopping { pid: u32 },
    /// Exited after Stop or after its cancellation token fired.
    Stopped,
    /// Exited on its own.
    Crashed { code: Option<i32> },
    /// Stop gave up waiting; the process may still be alive.
    Orphaned { pid: u32 },
}

impl ProcessState {
    /// Whether a live process is owned right now.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Stopping { .. })
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { pid } => write!(f, "running (pid {pid})"),
            Self::Stopping { pid } => write!(f, "stopping (pid {pid})"),
            Self::Stopped => write!(f, "stopped"),
            Self::Crashed { code: Some(code) } => write!(f, "crashed (exit code {code})"),
            Self::Crashed { code: None } => write!(f, "crashed (killed by signal)"),
            Self::Orphaned { pid } => write!(f, "orphaned (pid {pid} may still be running)"),
        }
    }
}

/// Manager-level lifecycle, combining install state with the process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotInstalled,
    Installed,
    Running,
    Stopping,
    Stopped,
    Crashed,
    Orphaned,
}

impl LifecycleState {
    /// Derive the lifecycle state from the install check and the process state.
    #[must_use]
    pub fn from_parts(installed: bool, process: ProcessState) -> Self {
        match process {
            ProcessState::Running { .. } => Self::Running,
            ProcessState::Stopping { .. } => Self::Stopping,
            ProcessState::Stopped => Self::Stopped,
            ProcessState::Crashed { .. } => Self::Crashed,
            ProcessState::Orphaned { .. } => Self::Orphaned,
            ProcessState::Idle if installed => Self::Installed,
            ProcessState::Idle => Self::NotInstalled,
        }
    }
}

/// How a successful Stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited within the stop timeout.
    Exited,
    /// The stop timeout elapsed; the supervisor no longer tracks the process
    /// as running, but it may still be alive.
    Orphaned { pid: u32 },
}

/// Flat status for a UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub installed: bool,
    pub running: bool,
    pub healthy: bool,
}

#[derive(Debug)]
struct Slot {
    /// Bumped on every start so a stale monitor cannot clobber a newer process.
    generation: u64,
    state: ProcessState,
    started_at: Option<DateTime<Utc>>,
    kill: Option<CancellationToken>,
    done: Option<CancellationToken>,
}

/// Owns the lifecycle of one external process.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    name: String,
    stop_timeout: Duration,
    slot: Arc<RwLock<Slot>>,
}

impl ProcessSupervisor {
    /// Create an idle supervisor; `name` is used in errors and logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            slot: Arc::new(RwLock::new(Slot {
                generation: 0,
                state: ProcessState::Idle,
                started_at: None,
                kill: None,
                done: None,
            })),
        }
    }

    /// Use a custom bound for the stop wait.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current process state.
    pub async fn state(&self) -> ProcessState {
        self.slot.read().await.state
    }

    /// Whether a live process is owned right now.
    pub async fn is_running(&self) -> bool {
        self.state().await.is_running()
    }

    /// PID of the owned process, if running.
    pub async fn pid(&self) -> Option<u32> {
        match self.state().await {
            ProcessState::Running { pid } | ProcessState::Stopping { pid } => Some(pid),
            _ => None,
        }
    }

    /// When the current (or last) process was started.
    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.started_at
    }

    /// Launch the process described by `spec` and return its PID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] without touching the current process
    /// if one is alive, [`Error::Spawn`] if the OS refuses to launch it.
    pub async fn start_process(&self, spec: ProcessSpec) -> Result<u32> {
        let mut slot = self.slot.write().await;

        if slot.state.is_running() {
            return Err(Error::AlreadyRunning(self.name.clone()));
        }
        if let ProcessState::Orphaned { pid } = slot.state {
            warn!(
                service = %self.name,
                orphan_pid = pid,
                "Starting {} while a previous process may still be alive",
                self.name
            );
        }

        let spawn_error = |source| Error::Spawn {
            name: self.name.clone(),
            source,
        };
        let mut cmd = spec.command().map_err(spawn_error)?;
        let child = cmd.spawn().map_err(spawn_error)?;
        let pid = child.id().unwrap_or_default();

        let kill = CancellationToken::new();
        let done = CancellationToken::new();
        slot.generation += 1;
        slot.state = ProcessState::Running { pid };
        slot.started_at = Some(Utc::now());
        slot.kill = Some(kill.clone());
        slot.done = Some(done.clone());

        match spec.log_path() {
            Some(log) => info!(
                service = %self.name,
                pid = pid,
                log = %log.display(),
                "{} started successfully",
                self.name
            ),
            None => info!(service = %self.name, pid = pid, "{} started successfully", self.name),
        }

        tokio::spawn(monitor(
            self.name.clone(),
            Arc::clone(&self.slot),
            slot.generation,
            child,
            Signals {
                kill,
                done,
                cancel: spec.cancel.clone(),
            },
            spec.log_path().cloned(),
        ));

        Ok(pid)
    }

    /// Kill the owned process and wait (bounded) for it to exit.
    ///
    /// A process already being stopped (after [`Self::kill`]) is waited on
    /// the same way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRunning`] if there is nothing to stop.
    pub async fn stop_process(&self) -> Result<StopOutcome> {
        let (pid, generation, kill, done) = {
            let mut slot = self.slot.write().await;
            let (ProcessState::Running { pid } | ProcessState::Stopping { pid }) = slot.state else {
                return Err(Error::NotRunning(self.name.clone()));
            };
            slot.state = ProcessState::Stopping { pid };
            (pid, slot.generation, slot.kill.clone(), slot.done.clone())
        };

        info!(service = %self.name, pid = pid, "Stopping {}...", self.name);
        if let Some(kill) = kill {
            kill.cancel();
        }

        let Some(done) = done else {
            return Ok(StopOutcome::Exited);
        };

        // A zero bound never waits
        let exited = done.is_cancelled()
            || (!self.stop_timeout.is_zero()
                && tokio::time::timeout(self.stop_timeout, done.cancelled())
                    .await
                    .is_ok());

        if exited {
            info!(service = %self.name, "{} stopped successfully", self.name);
            return Ok(StopOutcome::Exited);
        }

        warn!(
            service = %self.name,
            pid = pid,
            timeout_secs = self.stop_timeout.as_secs(),
            "{} did not stop within timeout, marking as orphaned",
            self.name
        );
        let mut slot = self.slot.write().await;
        if slot.generation == generation && slot.state.is_running() {
            slot.state = ProcessState::Orphaned { pid };
        }
        Ok(StopOutcome::Orphaned { pid })
    }

    /// Request termination without waiting for the exit.
    ///
    /// Returns the PID that was signalled, or `None` if nothing was running.
    pub async fn kill(&self) -> Option<u32> {
        let mut slot = self.slot.write().await;
        let pid = match slot.state {
            ProcessState::Running { pid } | ProcessState::Stopping { pid } => pid,
            _ => return None,
        };
        slot.state = ProcessState::Stopping { pid };
        if let Some(ref kill) = slot.kill {
            kill.cancel();
        }
        debug!(service = %self.name, pid = pid, "Kill requested");
        Some(pid)
    }

    /// Wait until the current process has exited (no-op if none was started).
    pub async fn wait_exit(&self) {
        let done = self.slot.read().await.done.clone();
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Poll `check` until healthy or `timeout`; see [`crate::health::wait_for_health`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::HealthTimeout`] if no check succeeded in time.
    pub async fn wait_for_health<F, Fut>(
        &self,
        timeout: Duration,
        interval: Duration,
        check: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        crate::health::wait_for_health(&self.name, timeout, interval, check).await
    }

    /// Build a status snapshot; `health` only runs when the process is running.
    pub async fn status<F, Fut>(&self, installed: bool, health: F) -> StatusSnapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let running = self.is_running().await;
        let healthy = running && health().await.is_ok();
        StatusSnapshot {
            installed,
            running,
            healthy,
        }
    }
}

struct Signals {
    kill: CancellationToken,
    done: CancellationToken,
    cancel: Option<CancellationToken>,
}

enum Exit {
    Natural(std::io::Result<ExitStatus>),
    Killed,
    Cancelled,
}

/// Owns the child until it exits, then records the outcome and fires `done`.
async fn monitor(
    name: String,
    slot: Arc<RwLock<Slot>>,
    generation: u64,
    mut child: Child,
    signals: Signals,
    log_path: Option<PathBuf>,
) {
    let cancel = signals.cancel.unwrap_or_default();

    let exit = tokio::select! {
        status = child.wait() => Exit::Natural(status),
        _ = signals.kill.cancelled() => Exit::Killed,
        _ = cancel.cancelled() => Exit::Cancelled,
    };

    let (status, requested) = match exit {
        Exit::Natural(status) => (status, false),
        Exit::Killed => (terminate(&name, &mut child).await, true),
        Exit::Cancelled => {
            info!(service = %name, "Cancellation requested, terminating {}", name);
            (terminate(&name, &mut child).await, true)
        }
    };

    let code = match status {
        Ok(status) if status.success() => {
            info!(service = %name, "{} process exited normally", name);
            status.code()
        }
        Ok(status) => {
            match log_path {
                Some(ref log) => warn!(
                    service = %name,
                    status = %status,
                    "{} process exited with error (check logs at: {})",
                    name,
                    log.display()
                ),
                None => warn!(service = %name, status = %status, "{} process exited with error", name),
            }
            status.code()
        }
        Err(e) => {
            warn!(service = %name, error = %e, "Failed to wait for {} process", name);
            None
        }
    };

    {
        let mut slot = slot.write().await;
        if slot.generation == generation {
            slot.state = match slot.state {
                ProcessState::Running { .. } if !requested => ProcessState::Crashed { code },
                _ => ProcessState::Stopped,
            };
            slot.kill = None;
        }
    }

    signals.done.cancel();
}

async fn terminate(name: &str, child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!(service = name, error = %e, "Kill failed, process may have exited already");
    }
    child.wait().await
}
