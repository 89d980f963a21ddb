//! Tool execution subsystem: command construction, per-tool state machines
//! and the registry the dispatch layer resolves them through.

pub mod command;
pub mod controller;
pub mod error;
pub mod registry;
pub mod report;
pub mod tool_id;

pub use command::{CommandBuilder, CommandSpec, FindParams, ToolParams, YaraParams};
pub use controller::{RunSettings, ToolController};
pub use error::{ErrorKind, ToolboxError};
pub use registry::{ToolRegistry, list_rulesets};
pub use report::{Phase, RunReport, Termination};
pub use tool_id::ToolId;
