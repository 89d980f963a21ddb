//! Per-tool state machine.
//!
//! A controller owns at most one run at a time. Every transition happens
//! under its lock; the phase only leaves `Running` when a poll (`status`,
//! or the re-check at the end of `stop`) observes that the process is gone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lxexplorer_config::ToolsConfig;
use lxexplorer_runner::{ProcessHandle, ProcessState, spawn_process};
use tokio::sync::Mutex;

use super::command::{CommandBuilder, CommandSpec, ToolParams};
use super::error::ToolboxError;
use super::report::{Phase, RunReport};
use super::tool_id::ToolId;

const TIMED_OUT_MESSAGE: &str = "run timed out";

/// Limits applied to every run of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub grace_period: Duration,
    pub run_timeout: Option<Duration>,
    pub output_limit: usize,
}

impl From<&ToolsConfig> for RunSettings {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            run_timeout: config.run_timeout(),
            output_limit: config.output_limit_bytes,
        }
    }
}

struct RunRecord {
    id: u64,
    started_at: DateTime<Utc>,
    command: Vec<String>,
    /// Absent when the run failed before a process existed.
    handle: Option<Arc<ProcessHandle>>,
    stop_requested: bool,
    timed_out: bool,
    error: Option<String>,
}

#[derive(Default)]
struct ControllerState {
    phase: Phase,
    params: Option<ToolParams>,
    last_command: Option<CommandSpec>,
    run: Option<RunRecord>,
    runs_started: u64,
}

pub struct ToolController {
    tool: ToolId,
    builder: CommandBuilder,
    settings: RunSettings,
    state: Mutex<ControllerState>,
}

impl ToolController {
    pub fn new(tool: ToolId, builder: CommandBuilder, settings: RunSettings) -> Self {
        Self {
            tool,
            builder,
            settings,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn from_config(tool: ToolId, config: &ToolsConfig) -> Self {
        Self::new(tool, CommandBuilder::from_config(config), RunSettings::from(config))
    }

    pub fn tool(&self) -> ToolId {
        self.tool
    }

    /// Store parameters for the next `start`. Validation is deferred to
    /// `start` so the latest configuration always wins.
    pub async fn configure(&self, params: ToolParams) {
        let mut state = self.state.lock().await;
        tracing::debug!(tool = %self.tool, phase = %state.phase, "configured");
        state.params = Some(params);
    }

    /// Build the command line and launch it.
    ///
    /// Fails with [`ToolboxError::AlreadyRunning`] while the phase is
    /// `Running`, leaving the live run untouched. Build and spawn failures
    /// replace the previous run with a `Failed` record carrying the error.
    pub async fn start(&self) -> Result<(), ToolboxError> {
        let mut state = self.state.lock().await;
        if state.phase == Phase::Running {
            return Err(ToolboxError::AlreadyRunning(self.tool));
        }

        state.runs_started += 1;
        let id = state.runs_started;
        let params = state
            .params
            .clone()
            .unwrap_or_else(|| ToolParams::default_for(self.tool));

        let spec = match self.builder.build(self.tool, &params) {
            Ok(spec) => spec,
            Err(err) => {
                self.record_failure(&mut state, id, Vec::new(), &err);
                return Err(err);
            }
        };
        let command = spec.argv();
        state.last_command = Some(spec.clone());

        match spawn_process(spec.to_spawn_options(self.settings.output_limit)) {
            Ok(handle) => {
                tracing::info!(tool = %self.tool, pid = handle.pid(), ?command, "run started");
                state.run = Some(RunRecord {
                    id,
                    started_at: DateTime::<Utc>::from(handle.started_at()),
                    command,
                    handle: Some(Arc::new(handle)),
                    stop_requested: false,
                    timed_out: false,
                    error: None,
                });
                state.phase = Phase::Running;
                Ok(())
            }
            Err(source) => {
                let err = ToolboxError::Spawn {
                    tool: self.tool,
                    source,
                };
                self.record_failure(&mut state, id, command, &err);
                Err(err)
            }
        }
    }

    /// Current phase, advancing out of `Running` if the process has exited.
    pub async fn status(&self) -> Phase {
        let mut state = self.state.lock().await;
        self.refresh(&mut state)
    }

    /// Report on the latest run. Partial while running.
    pub async fn results(&self) -> Result<RunReport, ToolboxError> {
        let state = self.state.lock().await;
        let run = state.run.as_ref().ok_or(ToolboxError::NoRun(self.tool))?;

        let mut report = RunReport {
            tool: self.tool,
            phase: state.phase,
            pid: None,
            started_at: run.started_at,
            command: run.command.clone(),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            exit_code: None,
            signal: None,
            termination: None,
            timed_out: run.timed_out,
            error: run.error.clone(),
        };

        if let Some(handle) = &run.handle {
            report.pid = Some(handle.pid());
            report.stdout = handle.stdout().to_string_lossy();
            report.stderr = handle.stderr().to_string_lossy();
            report.truncated = handle.stdout().is_truncated() || handle.stderr().is_truncated();
            if state.phase.is_terminal()
                && let Some(exit) = handle.exit_info()
            {
                report.apply_exit(exit);
            }
        }

        Ok(report)
    }

    /// Terminate the live run. A no-op unless the phase is `Running`.
    ///
    /// The lock is released while the grace period elapses so polls keep
    /// answering; `start` still sees `Running` and is refused.
    pub async fn stop(&self) -> Result<(), ToolboxError> {
        let (id, handle) = {
            let mut state = self.state.lock().await;
            if self.refresh(&mut state) != Phase::Running {
                tracing::debug!(tool = %self.tool, phase = %state.phase, "stop ignored");
                return Ok(());
            }
            let Some(run) = state.run.as_mut() else {
                return Ok(());
            };
            let Some(handle) = run.handle.clone() else {
                return Ok(());
            };
            run.stop_requested = true;
            (run.id, handle)
        };

        tracing::info!(tool = %self.tool, pid = handle.pid(), "stopping run");
        match handle.terminate(self.settings.grace_period).await {
            Ok(outcome) => tracing::debug!(tool = %self.tool, pid = handle.pid(), ?outcome, "terminated"),
            Err(err) => {
                tracing::warn!(tool = %self.tool, pid = handle.pid(), error = %err, "failed to terminate run");
            }
        }

        let mut state = self.state.lock().await;
        if state.run.as_ref().is_some_and(|run| run.id == id) {
            self.refresh(&mut state);
        }
        Ok(())
    }

    /// The command line built by the most recent successful build.
    pub async fn last_command(&self) -> Option<CommandSpec> {
        self.state.lock().await.last_command.clone()
    }

    fn record_failure(&self, state: &mut ControllerState, id: u64, command: Vec<String>, err: &ToolboxError) {
        tracing::warn!(tool = %self.tool, error = %err, "run failed to start");
        state.run = Some(RunRecord {
            id,
            started_at: Utc::now(),
            command,
            handle: None,
            stop_requested: false,
            timed_out: false,
            error: Some(err.to_string()),
        });
        state.phase = Phase::Failed;
    }

    fn refresh(&self, state: &mut ControllerState) -> Phase {
        if state.phase != Phase::Running {
            return state.phase;
        }
        let Some(run) = state.run.as_mut() else {
            return state.phase;
        };
        let Some(handle) = run.handle.clone() else {
            return state.phase;
        };

        match handle.poll() {
            ProcessState::Running => {
                if let Some(limit) = self.settings.run_timeout
                    && !run.timed_out
                    && !run.stop_requested
                    && handle.elapsed() >= limit
                {
                    tracing::warn!(tool = %self.tool, pid = handle.pid(), ?limit, "run timed out");
                    run.timed_out = true;
                    run.error = Some(TIMED_OUT_MESSAGE.to_string());
                    let tool = self.tool;
                    let grace_period = self.settings.grace_period;
                    tokio::spawn(async move {
                        if let Err(err) = handle.terminate(grace_period).await {
                            tracing::warn!(%tool, pid = handle.pid(), error = %err, "failed to terminate timed out run");
                        }
                    });
                } else {
                    tracing::trace!(tool = %self.tool, pid = handle.pid(), "still running");
                }
            }
            ProcessState::Terminated(exit) => {
                let phase = if run.timed_out {
                    Phase::Failed
                } else if run.stop_requested {
                    Phase::Stopped
                } else if exit.success() {
                    Phase::Completed
                } else {
                    Phase::Failed
                };
                tracing::info!(
                    tool = %self.tool,
                    pid = handle.pid(),
                    exit_code = ?exit.code,
                    signal = ?exit.signal,
                    %phase,
                    "run finished"
                );
                state.phase = phase;
            }
        }

        state.phase
    }
}
