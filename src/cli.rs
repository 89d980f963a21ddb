//! Command-line surface and its handlers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lxexplorer::dispatch::{Dispatcher, Response};
use lxexplorer::toolbox::{FindParams, ToolId, ToolParams, ToolRegistry, YaraParams};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Parser)]
#[command(
    name = "lxexplorer",
    version,
    about = "Run forensic tools (yara, chkrootkit, find) as supervised background processes"
)]
pub struct Cli {
    /// Load exactly this configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory searched for lxexplorer.toml (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Override a configuration value, e.g. `-c tools.grace_period_ms=200`
    #[arg(short = 'c', long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Answer JSON requests read line by line from stdin
    Serve,
    /// Run one tool to completion and print its report
    Run(RunArgs),
    /// List rulesets available in the rules directory
    Rulesets,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Tool to launch: yara, chkrootkit or find
    pub tool: ToolId,

    /// Ruleset name or path (yara)
    #[arg(long)]
    pub ruleset: Option<String>,

    /// Process to scan (yara)
    #[arg(long)]
    pub pid: Option<i64>,

    /// Directory to scan or search (yara, find)
    #[arg(long = "dir", value_name = "DIR")]
    pub directory: Option<String>,

    /// Only scan the top level of --dir (yara)
    #[arg(long)]
    pub no_recursive: bool,

    /// File name pattern (find)
    #[arg(long = "name", value_name = "PATTERN")]
    pub name_pattern: Option<String>,

    /// Milliseconds between status polls
    #[arg(long, default_value_t = 250)]
    pub poll_ms: u64,
}

impl RunArgs {
    pub fn params(&self) -> ToolParams {
        match self.tool {
            ToolId::Yara => ToolParams::Yara(YaraParams {
                ruleset_path: self.ruleset.clone().unwrap_or_default(),
                pid: self.pid,
                directory: self.directory.clone(),
                recursive: Some(!self.no_recursive),
            }),
            ToolId::Chkrootkit => ToolParams::Chkrootkit,
            ToolId::Find => ToolParams::Find(FindParams {
                directory: self.directory.clone().unwrap_or_default(),
                name_pattern: self.name_pattern.clone().unwrap_or_default(),
            }),
        }
    }
}

pub async fn handle_serve(registry: ToolRegistry) -> Result<ExitCode> {
    let dispatcher = Dispatcher::new(registry);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("serving requests on stdin");
    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }
        let mut response = dispatcher.handle_line(&line).await;
        response.push('\n');
        stdout
            .write_all(response.as_bytes())
            .await
            .context("failed to write response")?;
        stdout.flush().await.context("failed to flush response")?;
    }

    tracing::info!("stdin closed; shutting down");
    Ok(ExitCode::SUCCESS)
}

/// Start a run, poll it to a terminal phase and print the report.
///
/// Ctrl-C stops the run instead of abandoning it.
pub async fn handle_run(registry: ToolRegistry, args: RunArgs) -> Result<ExitCode> {
    let controller = registry.controller(args.tool);
    controller.configure(args.params()).await;

    if let Err(err) = controller.start().await {
        print_json(&Response::from_error(&err))?;
        return Ok(ExitCode::FAILURE);
    }

    let interval = Duration::from_millis(args.poll_ms.max(10));
    let mut interrupted = std::pin::pin!(tokio::signal::ctrl_c());
    let phase = loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = &mut interrupted => {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "failed to listen for ctrl-c");
                }
                tracing::info!(tool = %args.tool, "interrupted; stopping run");
                controller.stop().await?;
                interrupted.set(tokio::signal::ctrl_c());
            }
        }

        let phase = controller.status().await;
        if phase.is_terminal() {
            break phase;
        }
    };

    let report = controller.results().await?;
    print_json(&report)?;

    Ok(if phase == lxexplorer::toolbox::Phase::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn handle_rulesets(registry: &ToolRegistry) -> Result<ExitCode> {
    let rulesets = registry.rulesets();
    if rulesets.is_empty() {
        tracing::info!(dir = %registry.rules_dir().display(), "no rulesets found");
    }
    for name in rulesets {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to encode report")?;
    println!("{rendered}");
    Ok(())
}
