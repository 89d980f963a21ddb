//! lxexplorer - supervised runner for host forensic tools
//!
//! Thin binary entry point that delegates to the CLI handlers.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use lxexplorer::toolbox::ToolRegistry;

mod cli;
mod main_helpers;

use cli::{Cli, Commands};
use main_helpers::{initialize_tracing, load_config};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    let config = load_config(&args)?;
    initialize_tracing(&config.logging);

    let registry = ToolRegistry::new(&config.tools);
    match args.command {
        Commands::Serve => cli::handle_serve(registry).await,
        Commands::Run(run) => cli::handle_run(registry, run).await,
        Commands::Rulesets => cli::handle_rulesets(&registry),
    }
}
