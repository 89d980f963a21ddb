//! Signalling a tool run as a unit.
//!
//! Each child becomes the leader of a fresh session in `pre_exec`, so its
//! pid doubles as the process-group id and a single `killpg` reaches every
//! helper it forks (chkrootkit shells out to dozens of them).
//!
//! Only Unix is supported; elsewhere signalling reports `Unsupported`.

use std::io;

/// Signal delivered to a run's process group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM, giving the tool a chance to flush and exit.
    Term,
    /// SIGKILL.
    #[default]
    Kill,
}

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited within the grace period after SIGTERM.
    GracefulExit,
    /// Needed SIGKILL.
    ForcefulKill,
    /// Had already exited; nothing was signalled.
    AlreadyExited,
}

/// `pre_exec` hook: new session, and on Linux SIGTERM when the parent dies.
///
/// `parent_pid` is read before the fork. If the parent is already gone by
/// the time the death signal is armed, the child terminates itself.
#[cfg(unix)]
pub(crate) fn isolate_child(parent_pid: libc::pid_t) -> io::Result<()> {
    // SAFETY: async-signal-safe libc calls made between fork and exec.
    unsafe {
        if libc::setsid() == -1 {
            let err = io::Error::last_os_error();
            // EPERM means we already lead a session; a new group is enough.
            if err.raw_os_error() != Some(libc::EPERM) {
                return Err(err);
            }
            if libc::setpgid(0, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        #[cfg(target_os = "linux")]
        {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::getppid() != parent_pid {
                libc::raise(libc::SIGTERM);
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = parent_pid;
    }
    Ok(())
}

/// Deliver `signal` to every member of `group`. A vanished group is fine.
#[cfg(unix)]
pub fn signal_group(group: u32, signal: KillSignal) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(group)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("process group {group} out of range")))?;
    let signo = match signal {
        KillSignal::Term => libc::SIGTERM,
        KillSignal::Kill => libc::SIGKILL,
    };

    // SAFETY: killpg has no memory-safety preconditions.
    if unsafe { libc::killpg(pgid, signo) } == 0 {
        return Ok(());
    }
    match io::Error::last_os_error() {
        err if err.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        err => Err(err),
    }
}

#[cfg(not(unix))]
pub fn signal_group(_group: u32, _signal: KillSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "tool runs can only be signalled on Unix",
    ))
}
