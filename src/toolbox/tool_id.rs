use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ToolboxError;

/// The closed set of tools the dashboard can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolId {
    Yara,
    Chkrootkit,
    Find,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::Yara, ToolId::Chkrootkit, ToolId::Find];

    pub const fn as_str(self) -> &'static str {
        match self {
            ToolId::Yara => "yara",
            ToolId::Chkrootkit => "chkrootkit",
            ToolId::Find => "find",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = ToolboxError;

    /// Identifiers are matched exactly; `YARA` is not `yara`.
    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == identifier)
            .ok_or_else(|| ToolboxError::UnknownTool(identifier.to_string()))
    }
}
