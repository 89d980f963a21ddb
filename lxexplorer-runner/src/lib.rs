//! Child-process plumbing for long-running analysis tools.
//!
//! A [`ProcessHandle`] owns exactly one spawned process: it places the child
//! in its own process group, captures stdout and stderr into bounded buffers
//! from background reader tasks, exposes a non-blocking [`ProcessHandle::poll`],
//! and terminates the whole group with a SIGTERM → SIGKILL escalation.
//!
//! Spawning requires a Tokio runtime; the reader and wait tasks run on it.

pub mod buffer;
pub mod pipe;
pub mod process;
pub mod process_group;

pub use buffer::OutputBuffer;
pub use pipe::{PipeSpawnOptions, spawn_process};
pub use process::{ExitInfo, ProcessHandle, ProcessState, TerminationReason};
pub use process_group::{KillSignal, TerminateOutcome};
