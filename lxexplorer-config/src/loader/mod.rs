pub mod layers;

mod builder;
mod config;
mod manager;
mod merge;

pub use builder::ConfigBuilder;
pub use config::ToolboxConfig;
pub use manager::{CONFIG_FILE_NAME, CONFIG_PATH_ENV, ConfigManager};
pub use merge::merge_toml_values;
