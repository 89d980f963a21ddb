//! Turns per-tool parameters into a launchable argument vector.
//!
//! User input never passes through a shell. Every value lands in its own
//! argv slot, and paths are canonicalized first so nothing the caller sends
//! can start with `-` and be parsed as an option by the tool.

use std::fs;
use std::path::{Path, PathBuf};

use lxexplorer_config::{ToolPrograms, ToolsConfig};
use lxexplorer_runner::PipeSpawnOptions;
use serde::{Deserialize, Serialize};

use super::error::ToolboxError;
use super::tool_id::ToolId;

/// Ruleset file extensions, in the order bare names are resolved.
pub(crate) const RULESET_EXTENSIONS: [&str; 2] = ["yar", "yara"];

/// Options for a YARA scan: either a running process or a directory tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YaraParams {
    /// Ruleset file, or a bare name resolved inside the rules directory.
    pub ruleset_path: String,
    pub pid: Option<i64>,
    pub directory: Option<String>,
    /// Descend into subdirectories; defaults to `true`.
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindParams {
    pub directory: String,
    /// Shell glob matched against file names (`find -name`).
    pub name_pattern: String,
}

/// Parameters stored by `configure` and consumed at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolParams {
    Yara(YaraParams),
    Chkrootkit,
    Find(FindParams),
}

impl ToolParams {
    /// Empty parameters for `tool`; only chkrootkit can start with these.
    pub fn default_for(tool: ToolId) -> Self {
        match tool {
            ToolId::Yara => Self::Yara(YaraParams::default()),
            ToolId::Chkrootkit => Self::Chkrootkit,
            ToolId::Find => Self::Find(FindParams::default()),
        }
    }

    pub fn tool(&self) -> ToolId {
        match self {
            Self::Yara(_) => ToolId::Yara,
            Self::Chkrootkit => ToolId::Chkrootkit,
            Self::Find(_) => ToolId::Find,
        }
    }

    /// Decode the option object sent by the dispatch layer.
    ///
    /// `null` means "no options". chkrootkit ignores whatever it is given.
    pub fn from_json(tool: ToolId, value: serde_json::Value) -> Result<Self, ToolboxError> {
        if value.is_null() {
            return Ok(Self::default_for(tool));
        }

        match tool {
            ToolId::Yara => serde_json::from_value(value)
                .map(Self::Yara)
                .map_err(|err| ToolboxError::invalid(format!("yara options: {err}"))),
            ToolId::Chkrootkit => Ok(Self::Chkrootkit),
            ToolId::Find => serde_json::from_value(value)
                .map(Self::Find)
                .map_err(|err| ToolboxError::invalid(format!("find options: {err}"))),
        }
    }
}

/// A fully resolved command line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            cwd: None,
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn to_spawn_options(&self, output_limit: usize) -> PipeSpawnOptions {
        let options = PipeSpawnOptions::new(self.program.clone())
            .args(self.args.iter().cloned())
            .output_limit(output_limit);
        match &self.cwd {
            Some(cwd) => options.cwd(cwd.clone()),
            None => options,
        }
    }
}

/// Builds [`CommandSpec`]s for every tool. Pure apart from path lookups.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    programs: ToolPrograms,
    rules_dir: PathBuf,
}

impl CommandBuilder {
    pub fn new(programs: ToolPrograms, rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            programs,
            rules_dir: rules_dir.into(),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.programs.clone(), config.rules_dir.clone())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    pub fn build(&self, tool: ToolId, params: &ToolParams) -> Result<CommandSpec, ToolboxError> {
        let spec = match (tool, params) {
            (ToolId::Yara, ToolParams::Yara(params)) => self.build_yara(params)?,
            (ToolId::Chkrootkit, ToolParams::Chkrootkit) => {
                CommandSpec::new(&self.programs.chkrootkit, Vec::new())
            }
            (ToolId::Find, ToolParams::Find(params)) => self.build_find(params)?,
            (tool, params) => {
                return Err(ToolboxError::invalid(format!(
                    "{} options cannot configure {tool}",
                    params.tool()
                )));
            }
        };

        tracing::debug!(%tool, argv = ?spec.argv(), "built command");
        Ok(spec)
    }

    fn build_yara(&self, params: &YaraParams) -> Result<CommandSpec, ToolboxError> {
        let ruleset = self.resolve_ruleset(&params.ruleset_path)?;

        let args = match (params.pid, params.directory.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(ToolboxError::invalid(
                    "yara accepts either `pid` or `directory`, not both",
                ));
            }
            (None, None) => {
                return Err(ToolboxError::invalid("yara requires `pid` or `directory`"));
            }
            (Some(pid), None) => {
                let pid = u32::try_from(pid)
                    .ok()
                    .filter(|pid| *pid > 0)
                    .ok_or_else(|| ToolboxError::invalid(format!("pid {pid} is not valid")))?;
                vec![ruleset, pid.to_string()]
            }
            (None, Some(directory)) => {
                let directory = canonical_directory(directory, "directory")?;
                let mut args = Vec::with_capacity(3);
                if params.recursive.unwrap_or(true) {
                    args.push("-r".to_string());
                }
                args.push(ruleset);
                args.push(directory);
                args
            }
        };

        Ok(CommandSpec::new(&self.programs.yara, args))
    }

    fn build_find(&self, params: &FindParams) -> Result<CommandSpec, ToolboxError> {
        let directory = canonical_directory(&params.directory, "directory")?;

        let pattern = params.name_pattern.as_str();
        if pattern.is_empty() {
            return Err(ToolboxError::invalid("namePattern must not be empty"));
        }
        if pattern.contains('/') || pattern.contains('\0') {
            return Err(ToolboxError::invalid(format!(
                "namePattern `{pattern}` must be a plain file name pattern"
            )));
        }

        Ok(CommandSpec::new(
            &self.programs.find,
            vec![directory, "-name".to_string(), pattern.to_string()],
        ))
    }

    /// Resolve `raw` to an existing ruleset file.
    ///
    /// A bare name such as `malware` means `<rules_dir>/malware.yar`, or
    /// `<rules_dir>/malware.yara` when only that exists.
    fn resolve_ruleset(&self, raw: &str) -> Result<String, ToolboxError> {
        if raw.trim().is_empty() {
            return Err(ToolboxError::invalid("rulesetPath must not be empty"));
        }

        let candidate = Path::new(raw);
        let is_bare_name = !raw.contains(std::path::MAIN_SEPARATOR) && candidate.extension().is_none();
        let path = if is_bare_name {
            RULESET_EXTENSIONS
                .iter()
                .map(|ext| self.rules_dir.join(format!("{raw}.{ext}")))
                .find(|path| path.is_file())
                .unwrap_or_else(|| self.rules_dir.join(format!("{raw}.{}", RULESET_EXTENSIONS[0])))
        } else {
            candidate.to_path_buf()
        };

        let resolved = fs::canonicalize(&path)
            .map_err(|err| ToolboxError::invalid(format!("ruleset `{raw}` not found: {err}")))?;
        if !resolved.is_file() {
            return Err(ToolboxError::invalid(format!("ruleset `{raw}` is not a file")));
        }
        path_to_arg(resolved)
    }
}

fn canonical_directory(raw: &str, field: &str) -> Result<String, ToolboxError> {
    if raw.trim().is_empty() {
        return Err(ToolboxError::invalid(format!("{field} must not be empty")));
    }

    let resolved = fs::canonicalize(raw).map_err(|err| {
        ToolboxError::invalid(format!("{field} `{raw}` is not accessible: {err}"))
    })?;
    if !resolved.is_dir() {
        return Err(ToolboxError::invalid(format!(
            "{field} `{raw}` is not a directory"
        )));
    }
    path_to_arg(resolved)
}

fn path_to_arg(path: PathBuf) -> Result<String, ToolboxError> {
    path.into_os_string()
        .into_string()
        .map_err(|raw| ToolboxError::invalid(format!("path {raw:?} is not valid UTF-8")))
}
