//! # lxexplorer
//!
//! Launches long-running host analysis tools (a YARA scan, a rootkit
//! checker, a filesystem search) as detached processes and exposes a
//! polling protocol over them: `run`, `status`, `results`, `stop`.
//!
//! - [`toolbox`] holds the command builder, per-tool controllers and the
//!   registry.
//! - [`dispatch`] is the JSON envelope a route layer calls into.
//! - Process supervision lives in `lxexplorer-runner`; configuration in
//!   `lxexplorer-config`.
//!
//! ```no_run
//! use lxexplorer::toolbox::{ToolParams, ToolRegistry};
//! use lxexplorer_config::ToolsConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let registry = ToolRegistry::new(&ToolsConfig::default());
//! let chkrootkit = registry.resolve("chkrootkit")?;
//! chkrootkit.configure(ToolParams::Chkrootkit).await;
//! chkrootkit.start().await?;
//! println!("{}", chkrootkit.status().await);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod toolbox;

pub use dispatch::{Dispatcher, Operation, Request, Response};
pub use toolbox::{
    CommandBuilder, CommandSpec, ErrorKind, Phase, RunReport, ToolController, ToolId, ToolParams,
    ToolRegistry, ToolboxError,
};
