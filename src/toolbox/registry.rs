//! Fixed mapping from tool identifier to controller.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lxexplorer_config::ToolsConfig;

use super::command::RULESET_EXTENSIONS;
use super::controller::ToolController;
use super::error::ToolboxError;
use super::tool_id::ToolId;

/// One controller per supported tool, created up front and never resized.
///
/// Dropping the registry drops the controllers, which kills any run that is
/// still live.
pub struct ToolRegistry {
    yara: Arc<ToolController>,
    chkrootkit: Arc<ToolController>,
    find: Arc<ToolController>,
    rules_dir: PathBuf,
}

impl ToolRegistry {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            yara: Arc::new(ToolController::from_config(ToolId::Yara, config)),
            chkrootkit: Arc::new(ToolController::from_config(ToolId::Chkrootkit, config)),
            find: Arc::new(ToolController::from_config(ToolId::Find, config)),
            rules_dir: config.rules_dir.clone(),
        }
    }

    /// Look up a controller by its wire name.
    pub fn resolve(&self, id: &str) -> Result<Arc<ToolController>, ToolboxError> {
        let tool: ToolId = id.parse()?;
        Ok(self.controller(tool))
    }

    pub fn controller(&self, tool: ToolId) -> Arc<ToolController> {
        match tool {
            ToolId::Yara => Arc::clone(&self.yara),
            ToolId::Chkrootkit => Arc::clone(&self.chkrootkit),
            ToolId::Find => Arc::clone(&self.find),
        }
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Names of the rulesets available in the rules directory, sorted.
    pub fn rulesets(&self) -> Vec<String> {
        list_rulesets(&self.rules_dir)
    }
}

/// Collect `*.yar`/`*.yara` file stems in `dir`. A missing directory yields
/// an empty list.
pub fn list_rulesets(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "rules directory unavailable");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| RULESET_EXTENSIONS.contains(&ext))
        })
        .filter_map(|path| path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    names
}
