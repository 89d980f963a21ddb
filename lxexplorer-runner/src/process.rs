//! Handle for one spawned tool process.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::buffer::OutputBuffer;
use crate::process_group::{self, KillSignal, TerminateOutcome};

/// How long to wait for the wait task to observe exit after SIGKILL.
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a process stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The process exited on its own.
    Exited,
    /// The process died from a signal or after a termination request.
    Killed,
}

/// Exit details published once the child has been reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, absent when the process died from a signal.
    pub code: Option<i32>,
    /// Terminating signal number, if any.
    pub signal: Option<i32>,
    pub reason: TerminationReason,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Terminated(ExitInfo),
}

/// Owns exactly one OS process and the output it produced.
///
/// The state only moves forward: once [`ProcessState::Terminated`] is
/// observed it never reverts. Dropping a handle whose process is still alive
/// SIGKILLs its process group.
pub struct ProcessHandle {
    pid: u32,
    process_group_id: u32,
    started_at: SystemTime,
    started: Instant,
    stdout: Arc<OutputBuffer>,
    stderr: Arc<OutputBuffer>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    kill_requested: Arc<AtomicBool>,
    task_handles: Mutex<Vec<AbortHandle>>,
}

/// Pieces assembled by the spawn helpers.
pub(crate) struct ProcessParts {
    pub pid: u32,
    pub stdout: Arc<OutputBuffer>,
    pub stderr: Arc<OutputBuffer>,
    pub exit_rx: watch::Receiver<Option<ExitInfo>>,
    pub kill_requested: Arc<AtomicBool>,
    pub task_handles: Vec<AbortHandle>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("state", &self.poll())
            .field("stdout_len", &self.stdout.len())
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn from_parts(parts: ProcessParts) -> Self {
        Self {
            pid: parts.pid,
            // The child calls setsid() before exec, so it leads its own group.
            process_group_id: parts.pid,
            started_at: SystemTime::now(),
            started: Instant::now(),
            stdout: parts.stdout,
            stderr: parts.stderr,
            exit_rx: parts.exit_rx,
            kill_requested: parts.kill_requested,
            task_handles: Mutex::new(parts.task_handles),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-blocking liveness check.
    pub fn poll(&self) -> ProcessState {
        match *self.exit_rx.borrow() {
            Some(info) => ProcessState::Terminated(info),
            None => ProcessState::Running,
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Standard output captured so far; complete once terminated.
    pub fn read_output(&self) -> Vec<u8> {
        self.stdout.snapshot()
    }

    pub fn read_stderr(&self) -> Vec<u8> {
        self.stderr.snapshot()
    }

    pub fn stdout(&self) -> &OutputBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputBuffer {
        &self.stderr
    }

    /// Wait until the process has exited and its output is drained.
    ///
    /// Returns `None` only if the wait task was torn down first.
    pub async fn wait(&self) -> Option<ExitInfo> {
        let mut exit_rx = self.exit_rx.clone();
        match exit_rx.wait_for(Option::is_some).await {
            Ok(info) => *info,
            Err(_) => None,
        }
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> Option<ExitInfo> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .ok()
            .flatten()
    }

    /// SIGTERM the process group, wait up to `grace_period`, then SIGKILL.
    ///
    /// Idempotent: a handle that already terminated returns
    /// [`TerminateOutcome::AlreadyExited`] without signalling.
    pub async fn terminate(&self, grace_period: Duration) -> io::Result<TerminateOutcome> {
        if self.has_exited() {
            return Ok(TerminateOutcome::AlreadyExited);
        }

        self.kill_requested.store(true, Ordering::SeqCst);
        process_group::signal_group(self.process_group_id, KillSignal::Term)?;

        if self.wait_timeout(grace_period).await.is_some() {
            tracing::debug!(pid = self.pid, "process exited after SIGTERM");
            return Ok(TerminateOutcome::GracefulExit);
        }

        tracing::debug!(pid = self.pid, ?grace_period, "grace period elapsed; sending SIGKILL");
        process_group::signal_group(self.process_group_id, KillSignal::Kill)?;

        if self.wait_timeout(KILL_CONFIRM_TIMEOUT).await.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("process {} did not exit after SIGKILL", self.pid),
            ));
        }

        Ok(TerminateOutcome::ForcefulKill)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.has_exited()
            && let Err(err) = process_group::signal_group(self.process_group_id, KillSignal::Kill)
        {
            tracing::warn!(pid = self.pid, error = %err, "failed to kill process group on drop");
        }

        for handle in self.task_handles.lock().drain(..) {
            handle.abort();
        }
    }
}
