use anyhow::{Context, Result};
use lxexplorer_config::{ConfigBuilder, LoggingConfig, ToolboxConfig};

use crate::cli::Cli;

/// Resolve the effective configuration from CLI flags and the layered files.
pub(crate) fn load_config(args: &Cli) -> Result<ToolboxConfig> {
    let mut builder = ConfigBuilder::new();
    if let Some(workspace) = &args.workspace {
        builder = builder.workspace(workspace.clone());
    }
    if let Some(file) = &args.config {
        builder = builder.config_file(file.clone());
    }

    let manager = builder
        .override_strings(&args.overrides)?
        .build()
        .context("failed to load configuration")?;
    if let Some(path) = manager.config_path() {
        tracing::debug!(path = %path.display(), "loaded configuration");
    }
    Ok(manager.into_config())
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub(crate) fn initialize_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; skipping setup");
    }
}
