use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

use crate::loader::config::ToolboxConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource};
use crate::loader::manager::ConfigManager;

/// Builder for a [`ConfigManager`] with an explicit file and runtime overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    workspace: Option<PathBuf>,
    config_file: Option<PathBuf>,
    overrides: Vec<(String, toml::Value)>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory searched for `lxexplorer.toml`.
    pub fn workspace(mut self, path: PathBuf) -> Self {
        self.workspace = Some(path);
        self
    }

    /// Load this file instead of the layered lookup.
    pub fn config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// Add an override such as `("tools.grace_period_ms", 200)`.
    pub fn override_value(mut self, key: impl Into<String>, value: toml::Value) -> Self {
        self.overrides.push((key.into(), value));
        self
    }

    /// Add overrides given as `key=value` strings.
    ///
    /// Integers, floats and booleans are recognized; anything else is kept as
    /// a string.
    pub fn override_strings<I, S>(mut self, raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in raw {
            let entry = entry.as_ref();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("override `{entry}` must have the form key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                bail!("override `{entry}` has an empty key");
            }
            self.overrides
                .push((key.to_string(), parse_override_value(value.trim())));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ConfigManager> {
        let mut manager = match (self.config_file, self.workspace) {
            (Some(file), _) => ConfigManager::load_from_file(file)?,
            (None, Some(workspace)) => ConfigManager::load_from_workspace(workspace)?,
            (None, None) => ConfigManager::load()?,
        };

        if self.overrides.is_empty() {
            return Ok(manager);
        }

        let mut runtime = toml::Table::new();
        for (key, value) in self.overrides {
            insert_dotted_key(&mut runtime, &key, value)?;
        }
        manager.layer_stack.push(ConfigLayerEntry::new(
            ConfigLayerSource::Runtime,
            toml::Value::Table(runtime),
        ));

        manager.config = ToolboxConfig::from_toml(manager.layer_stack.effective_config())
            .context("configuration failed validation after runtime overrides")?;

        Ok(manager)
    }
}

fn parse_override_value(raw: &str) -> toml::Value {
    if let Ok(int) = raw.parse::<i64>() {
        return toml::Value::Integer(int);
    }
    if let Ok(flag) = raw.parse::<bool>() {
        return toml::Value::Boolean(flag);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return toml::Value::Float(float);
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(raw);
    toml::Value::String(unquoted.to_string())
}

fn insert_dotted_key(table: &mut toml::Table, key: &str, value: toml::Value) -> Result<()> {
    let mut parts = key.split('.').peekable();
    let mut current = table;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return Ok(());
        }

        let entry = current
            .entry(part.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        current = entry
            .as_table_mut()
            .ok_or_else(|| anyhow!("override `{key}` conflicts with a non-table value at `{part}`"))?;
    }

    bail!("override key must not be empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_values_are_typed() {
        assert_eq!(parse_override_value("200"), toml::Value::Integer(200));
        assert_eq!(parse_override_value("true"), toml::Value::Boolean(true));
        assert_eq!(
            parse_override_value("\"/usr/bin/yara\""),
            toml::Value::String("/usr/bin/yara".to_string())
        );
        assert_eq!(
            parse_override_value("debug"),
            toml::Value::String("debug".to_string())
        );
    }

    #[test]
    fn dotted_keys_create_nested_tables() -> Result<()> {
        let mut table = toml::Table::new();
        insert_dotted_key(&mut table, "tools.programs.find", toml::Value::from("/bin/find"))?;
        insert_dotted_key(&mut table, "tools.grace_period_ms", toml::Value::from(100))?;

        let tools = table
            .get("tools")
            .and_then(toml::Value::as_table)
            .ok_or_else(|| anyhow!("tools table missing"))?;
        assert_eq!(
            tools.get("grace_period_ms").and_then(toml::Value::as_integer),
            Some(100)
        );
        assert!(tools.get("programs").is_some_and(toml::Value::is_table));
        Ok(())
    }

    #[test]
    fn dotted_key_through_scalar_is_rejected() -> Result<()> {
        let mut table = toml::Table::new();
        insert_dotted_key(&mut table, "logging", toml::Value::from("info"))?;
        assert!(insert_dotted_key(&mut table, "logging.level", toml::Value::from("debug")).is_err());
        Ok(())
    }

    #[test]
    fn malformed_override_string_is_rejected() {
        assert!(ConfigBuilder::new().override_strings(["tools.grace_period_ms"]).is_err());
        assert!(ConfigBuilder::new().override_strings(["=5"]).is_err());
    }
}
