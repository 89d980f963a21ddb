//! Serializable views of a controller's state.

use std::fmt;

use chrono::{DateTime, Utc};
use lxexplorer_runner::{ExitInfo, TerminationReason};
use serde::{Deserialize, Serialize};

use super::tool_id::ToolId;

/// Lifecycle phase of a tool controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished run's process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Exited,
    Killed,
}

impl From<TerminationReason> for Termination {
    fn from(reason: TerminationReason) -> Self {
        match reason {
            TerminationReason::Exited => Self::Exited,
            TerminationReason::Killed => Self::Killed,
        }
    }
}

/// Everything known about the most recent run of a tool.
///
/// While the run is live `stdout`/`stderr` hold whatever has been captured
/// so far and the exit fields are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub tool: ToolId,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub command: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub(crate) fn apply_exit(&mut self, exit: ExitInfo) {
        self.exit_code = exit.code;
        self.signal = exit.signal;
        self.termination = Some(exit.reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Completed).ok().as_deref(), Some("\"completed\""));
        assert_eq!(Phase::Stopped.to_string(), "stopped");
        assert!(!Phase::Running.is_terminal());
        assert!(!Phase::Idle.is_terminal());
        assert!(Phase::Failed.is_terminal());
    }

    #[test]
    fn live_report_omits_exit_fields() -> anyhow::Result<()> {
        let report = RunReport {
            tool: ToolId::Find,
            phase: Phase::Running,
            pid: Some(42),
            started_at: Utc::now(),
            command: vec!["find".into(), "/tmp".into()],
            stdout: "partial".into(),
            stderr: String::new(),
            truncated: false,
            exit_code: None,
            signal: None,
            termination: None,
            timed_out: false,
            error: None,
        };

        let json = serde_json::to_value(&report)?;
        assert_eq!(json["phase"], "running");
        assert_eq!(json["tool"], "find");
        assert!(json.get("exit_code").is_none());
        assert!(json.get("termination").is_none());
        Ok(())
    }
}
