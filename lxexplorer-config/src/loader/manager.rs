use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::loader::config::ToolboxConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

/// File name looked up in every configuration layer.
pub const CONFIG_FILE_NAME: &str = "lxexplorer.toml";

/// Environment variable naming a single configuration file to load.
pub const CONFIG_PATH_ENV: &str = "LXEXPLORER_CONFIG_PATH";

#[cfg(unix)]
const SYSTEM_CONFIG_PATH: &str = "/etc/lxexplorer/lxexplorer.toml";

/// Loads, merges and validates configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub(crate) config: ToolboxConfig,
    pub(crate) layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations.
    ///
    /// `LXEXPLORER_CONFIG_PATH` short-circuits layering; otherwise the current
    /// directory is treated as the workspace.
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("failed to load configuration from {CONFIG_PATH_ENV}={trimmed}")
                });
            }
        }

        let workspace = std::env::current_dir().context("failed to resolve current directory")?;
        Self::load_from_workspace(workspace)
    }

    /// Load the system, user and workspace layers, in that order.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let mut sources = Vec::new();

        #[cfg(unix)]
        sources.push(ConfigLayerSource::System {
            file: PathBuf::from(SYSTEM_CONFIG_PATH),
        });

        if let Some(file) = Self::user_config_path() {
            sources.push(ConfigLayerSource::User { file });
        }

        sources.push(ConfigLayerSource::Workspace {
            file: workspace.as_ref().join(CONFIG_FILE_NAME),
        });

        Self::load_layers(sources)
    }

    /// Load whichever of `sources` exist, lowest precedence first.
    ///
    /// Layers that cannot be read or parsed are skipped with a warning so a
    /// broken system file does not take the dashboard down.
    pub fn load_layers(sources: impl IntoIterator<Item = ConfigLayerSource>) -> Result<Self> {
        let mut layer_stack = ConfigLayerStack::default();

        for source in sources {
            let Some(file) = source.file() else {
                continue;
            };
            if !file.is_file() {
                continue;
            }

            match Self::load_toml_from_file(file) {
                Ok(toml) => {
                    tracing::debug!(path = %file.display(), "loaded configuration layer");
                    layer_stack.push(ConfigLayerEntry::new(source.clone(), toml));
                }
                Err(err) => {
                    tracing::warn!(path = %file.display(), error = %format!("{err:#}"), "skipping unreadable configuration layer");
                }
            }
        }

        Self::from_stack(layer_stack)
    }

    /// Load exactly one file, bypassing the layered lookup.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let toml = Self::load_toml_from_file(path)?;

        let mut layer_stack = ConfigLayerStack::default();
        layer_stack.push(ConfigLayerEntry::new(
            ConfigLayerSource::Workspace {
                file: path.to_path_buf(),
            },
            toml,
        ));

        Self::from_stack(layer_stack)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub(crate) fn from_stack(layer_stack: ConfigLayerStack) -> Result<Self> {
        let config = if layer_stack.is_empty() {
            let config = ToolboxConfig::default();
            config
                .validate()
                .context("default configuration failed validation")?;
            config
        } else {
            ToolboxConfig::from_toml(layer_stack.effective_config())?
        };

        Ok(Self {
            config,
            layer_stack,
        })
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lxexplorer").join(CONFIG_FILE_NAME))
    }

    pub fn config(&self) -> &ToolboxConfig {
        &self.config
    }

    pub fn into_config(self) -> ToolboxConfig {
        self.config
    }

    /// Highest-precedence file that contributed to the configuration.
    pub fn config_path(&self) -> Option<&Path> {
        self.layer_stack.last_file()
    }

    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }
}
