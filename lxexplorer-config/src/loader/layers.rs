use std::path::{Path, PathBuf};

use toml::Value as TomlValue;

use crate::loader::merge_toml_values;

/// Where a configuration layer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// System-wide configuration (`/etc/lxexplorer/lxexplorer.toml`).
    System { file: PathBuf },
    /// Per-user configuration (`~/.config/lxexplorer/lxexplorer.toml`).
    User { file: PathBuf },
    /// Workspace configuration, or a file named explicitly by the caller.
    Workspace { file: PathBuf },
    /// Runtime overrides such as `-c key=value` flags.
    Runtime,
}

impl ConfigLayerSource {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::System { file } | Self::User { file } | Self::Workspace { file } => Some(file),
            Self::Runtime => None,
        }
    }
}

/// A single parsed layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayerEntry {
    pub source: ConfigLayerSource,
    pub config: TomlValue,
}

impl ConfigLayerEntry {
    pub fn new(source: ConfigLayerSource, config: TomlValue) -> Self {
        Self { source, config }
    }
}

/// Layers ordered from lowest to highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayerStack {
    layers: Vec<ConfigLayerEntry>,
}

impl ConfigLayerStack {
    pub fn push(&mut self, layer: ConfigLayerEntry) {
        self.layers.push(layer);
    }

    /// Merge every layer into one TOML document.
    pub fn effective_config(&self) -> TomlValue {
        let mut merged = TomlValue::Table(toml::Table::new());
        for layer in &self.layers {
            merge_toml_values(&mut merged, &layer.config);
        }
        merged
    }

    pub fn layers(&self) -> &[ConfigLayerEntry] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The highest-precedence layer that was read from disk.
    pub fn last_file(&self) -> Option<&Path> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.source.file())
    }
}
