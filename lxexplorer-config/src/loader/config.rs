use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::tools::ToolsConfig;

/// Root of `lxexplorer.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolboxConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ToolboxConfig {
    pub fn validate(&self) -> Result<()> {
        self.tools.validate().context("invalid [tools] section")?;
        self.logging.validate().context("invalid [logging] section")?;
        Ok(())
    }

    /// Deserialize and validate an already merged TOML value.
    pub fn from_toml(value: toml::Value) -> Result<Self> {
        let config: Self = value
            .try_into()
            .context("failed to deserialize effective configuration")?;
        config
            .validate()
            .context("configuration failed validation")?;
        Ok(config)
    }
}
