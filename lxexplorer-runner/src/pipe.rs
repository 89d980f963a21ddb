//! Pipe-based spawning for non-interactive tool processes.
//!
//! The child gets `/dev/null` for stdin, piped stdout and stderr, a fresh
//! session (and therefore process group), and a parent-death signal on Linux.
//! Arguments are passed as a discrete vector; no shell is involved.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::buffer::OutputBuffer;
use crate::process::{ExitInfo, ProcessHandle, ProcessParts, TerminationReason};
#[cfg(unix)]
use crate::process_group;

const READ_CHUNK_SIZE: usize = 8_192;

/// How long the readers may keep draining after the child is reaped.
///
/// Grandchildren that inherited the pipes can keep them open indefinitely;
/// past this window the readers are aborted and the capture is final.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default per-stream capture limit (8 MiB).
pub const DEFAULT_OUTPUT_LIMIT: usize = 8 * 1024 * 1024;

/// Options for spawning a pipe-based process.
#[derive(Debug, Clone)]
pub struct PipeSpawnOptions {
    /// Executable name or path, resolved through `PATH`.
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits ours when `None`.
    pub cwd: Option<PathBuf>,
    /// Capture limit applied to stdout and stderr separately.
    pub output_limit: usize,
}

impl PipeSpawnOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }
}

/// Read until EOF, appending into `buffer`.
///
/// Reading continues past the buffer limit so a chatty child never blocks on
/// a full pipe.
async fn read_into_buffer<R>(mut reader: R, buffer: Arc<OutputBuffer>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.append(&chunk[..n]);
            }
            Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(error = %err, "output reader stopped");
                break;
            }
        }
    }
}

fn exit_info_from_status(status: std::process::ExitStatus, kill_requested: bool) -> ExitInfo {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    let reason = if kill_requested || signal.is_some() {
        TerminationReason::Killed
    } else {
        TerminationReason::Exited
    };

    ExitInfo {
        code: status.code(),
        signal,
        reason,
    }
}

/// Reap the child, let the readers drain, then publish the exit.
async fn wait_for_child(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    reader_aborts: Vec<AbortHandle>,
    kill_requested: Arc<AtomicBool>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    let pid = child.id();
    let status = child.wait().await;

    let drain = async {
        for reader in readers {
            let _ = reader.await;
        }
    };
    if tokio::time::timeout(READER_DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::debug!(?pid, "output still open after exit; aborting readers");
        for abort in reader_aborts {
            abort.abort();
        }
    }

    let killed = kill_requested.load(Ordering::SeqCst);
    let info = match status {
        Ok(status) => exit_info_from_status(status, killed),
        Err(err) => {
            tracing::warn!(?pid, error = %err, "failed to wait for child process");
            ExitInfo {
                code: None,
                signal: None,
                reason: if killed {
                    TerminationReason::Killed
                } else {
                    TerminationReason::Exited
                },
            }
        }
    };

    tracing::debug!(?pid, code = ?info.code, signal = ?info.signal, "child process reaped");
    exit_tx.send_replace(Some(info));
}

/// Spawn a process described by `opts` and start capturing its output.
///
/// Must be called from within a Tokio runtime. Fails if the program is
/// missing, not executable, or the OS refuses the fork.
pub fn spawn_process(opts: PipeSpawnOptions) -> Result<ProcessHandle> {
    if opts.program.is_empty() {
        bail!("missing program for pipe spawn");
    }

    let runtime = tokio::runtime::Handle::try_current()
        .context("spawning a tool process requires a Tokio runtime")?;

    let mut command = Command::new(&opts.program);
    command.args(&opts.args);

    #[cfg(unix)]
    {
        // SAFETY: getpid cannot fail; the hook only makes async-signal-safe calls.
        let parent_pid = unsafe { libc::getpid() };
        unsafe {
            command.pre_exec(move || process_group::isolate_child(parent_pid));
        }
    }

    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", opts.program))?;
    let Some(pid) = child.id() else {
        bail!("spawned `{}` but it has no pid", opts.program);
    };

    let stdout = Arc::new(OutputBuffer::new(opts.output_limit));
    let stderr = Arc::new(OutputBuffer::new(opts.output_limit));

    let mut readers = Vec::with_capacity(2);
    if let Some(pipe) = child.stdout.take() {
        readers.push(runtime.spawn(read_into_buffer(pipe, Arc::clone(&stdout))));
    }
    if let Some(pipe) = child.stderr.take() {
        readers.push(runtime.spawn(read_into_buffer(pipe, Arc::clone(&stderr))));
    }
    let reader_aborts: Vec<AbortHandle> = readers.iter().map(JoinHandle::abort_handle).collect();

    let (exit_tx, exit_rx) = watch::channel(None);
    let kill_requested = Arc::new(AtomicBool::new(false));
    let wait_handle = runtime.spawn(wait_for_child(
        child,
        readers,
        reader_aborts.clone(),
        Arc::clone(&kill_requested),
        exit_tx,
    ));

    let mut task_handles = reader_aborts;
    task_handles.push(wait_handle.abort_handle());

    tracing::debug!(pid, program = %opts.program, args = ?opts.args, "spawned tool process");

    Ok(ProcessHandle::from_parts(ProcessParts {
        pid,
        stdout,
        stderr,
        exit_rx,
        kill_requested,
        task_handles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_builder_collects_arguments() {
        let opts = PipeSpawnOptions::new("find")
            .args(["/tmp", "-name", "*.so"])
            .cwd("/")
            .output_limit(1_024);

        assert_eq!(opts.program, "find");
        assert_eq!(opts.args, vec!["/tmp", "-name", "*.so"]);
        assert_eq!(opts.cwd, Some(PathBuf::from("/")));
        assert_eq!(opts.output_limit, 1_024);
    }

    #[test]
    fn spawning_outside_a_runtime_is_an_error() {
        let err = spawn_process(PipeSpawnOptions::new("true")).unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[tokio::test]
    async fn empty_program_is_rejected() {
        let err = spawn_process(PipeSpawnOptions::new("")).unwrap_err();
        assert!(err.to_string().contains("missing program"));
    }
}
