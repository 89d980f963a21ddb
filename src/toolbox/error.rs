//! Error taxonomy for the tool execution subsystem.
//!
//! Every variant is recoverable and scoped to one request; none of them
//! poison the registry or another tool's controller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tool_id::ToolId;

#[derive(Debug, Error)]
pub enum ToolboxError {
    /// Parameters were missing, empty, or failed a path sanity check.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    /// A run of this tool is still in progress.
    #[error("{0} is already running")]
    AlreadyRunning(ToolId),

    /// The OS refused to launch the tool's process.
    #[error("failed to launch {tool}: {source:#}")]
    Spawn {
        tool: ToolId,
        #[source]
        source: anyhow::Error,
    },

    /// Results were requested before the tool ever ran.
    #[error("{0} has not been run yet")]
    NoRun(ToolId),
}

/// Serializable discriminant of [`ToolboxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameters,
    UnknownTool,
    AlreadyRunning,
    SpawnError,
    NoRun,
}

impl ToolboxError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameters(_) => ErrorKind::InvalidParameters,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            Self::Spawn { .. } => ErrorKind::SpawnError,
            Self::NoRun(_) => ErrorKind::NoRun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_message_includes_cause_chain() {
        let source = anyhow::anyhow!("No such file or directory").context("failed to spawn `yara`");
        let err = ToolboxError::Spawn {
            tool: ToolId::Yara,
            source,
        };
        assert_eq!(err.kind(), ErrorKind::SpawnError);
        let message = err.to_string();
        assert!(message.contains("failed to spawn `yara`"));
        assert!(message.contains("No such file or directory"));
    }

    #[test]
    fn kinds_serialize_snake_case() -> anyhow::Result<()> {
        assert_eq!(
            serde_json::to_string(&ErrorKind::AlreadyRunning)?,
            "\"already_running\""
        );
        assert_eq!(
            serde_json::to_string(&ToolboxError::NoRun(ToolId::Find).kind())?,
            "\"no_run\""
        );
        Ok(())
    }
}
