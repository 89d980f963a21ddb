//! Configuration for the Linux Explorer tool runner.
//!
//! The effective [`ToolboxConfig`] is assembled from layered TOML files
//! (system, user, workspace) plus runtime overrides, and is validated before
//! any tool controller is built from it.

pub mod loader;
pub mod logging;
pub mod tools;

pub use loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};
pub use loader::{
    CONFIG_FILE_NAME, CONFIG_PATH_ENV, ConfigBuilder, ConfigManager, ToolboxConfig,
    merge_toml_values,
};
pub use logging::LoggingConfig;
pub use tools::{ToolPrograms, ToolsConfig};
