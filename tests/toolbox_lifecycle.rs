//! End-to-end controller behavior against real child processes.
//!
//! Tool executables are replaced by small shell scripts. Tests are serialized
//! so no test forks while another is still writing its script.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use lxexplorer::toolbox::{
    FindParams, Phase, Termination, ToolController, ToolId, ToolParams, ToolRegistry,
    ToolboxError, YaraParams,
};
use lxexplorer_config::{ToolPrograms, ToolsConfig};
use serial_test::serial;
use tempfile::TempDir;

const SLOW_TOOL: &str = "echo started\nsleep 30\n";
const STUBBORN_TOOL: &str = "trap '' TERM\necho started\nwhile :; do sleep 1; done\n";
const SIGKILL: i32 = 9;

fn write_script(dir: &Path, name: &str, body: &str) -> Result<String> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path.to_string_lossy().into_owned())
}

fn tools_config(root: &TempDir, programs: ToolPrograms) -> ToolsConfig {
    ToolsConfig {
        rules_dir: root.path().join("yara_rules"),
        grace_period_ms: 200,
        programs,
        ..ToolsConfig::default()
    }
}

fn chkrootkit_registry(root: &TempDir, body: &str) -> Result<ToolRegistry> {
    let programs = ToolPrograms {
        chkrootkit: write_script(root.path(), "chkrootkit", body)?,
        ..ToolPrograms::default()
    };
    Ok(ToolRegistry::new(&tools_config(root, programs)))
}

async fn wait_for_terminal(controller: &ToolController) -> Result<Phase> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let phase = controller.status().await;
        if phase.is_terminal() {
            return Ok(phase);
        }
        if Instant::now() > deadline {
            bail!("{} still {phase} after 10s", controller.tool());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_output(controller: &ToolController, needle: &str) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if controller.results().await?.stdout.contains(needle) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("`{needle}` never appeared in output")
}

#[tokio::test]
#[serial]
async fn yara_directory_scan_completes_with_output() -> Result<()> {
    let root = TempDir::new()?;
    let rules = root.path().join("rules");
    fs::create_dir_all(&rules)?;
    fs::write(rules.join("test.yar"), "rule t { condition: true }")?;
    let target = root.path().join("target");
    fs::create_dir_all(&target)?;

    let programs = ToolPrograms {
        yara: write_script(root.path(), "yara", "echo \"scanned $*\"\n")?,
        ..ToolPrograms::default()
    };
    let registry = ToolRegistry::new(&tools_config(&root, programs));
    let yara = registry.resolve("yara")?;

    yara.configure(ToolParams::Yara(YaraParams {
        ruleset_path: rules.join("test.yar").to_string_lossy().into_owned(),
        directory: Some(target.to_string_lossy().into_owned()),
        recursive: Some(true),
        pid: None,
    }))
    .await;
    yara.start().await?;
    assert_eq!(yara.status().await, Phase::Running);

    assert_eq!(wait_for_terminal(&yara).await?, Phase::Completed);
    let report = yara.results().await?;
    assert_eq!(report.phase, Phase::Completed);
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.termination, Some(Termination::Exited));
    assert!(report.stdout.starts_with("scanned -r "), "{}", report.stdout);
    assert!(report.stdout.contains("test.yar"));
    assert_eq!(report.command.get(1).map(String::as_str), Some("-r"));
    Ok(())
}

#[tokio::test]
#[serial]
async fn phase_leaves_running_once_and_stays_terminal() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, "echo oops >&2\nexit 3\n")?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    assert_eq!(wait_for_terminal(&controller).await?, Phase::Failed);
    for _ in 0..3 {
        assert_eq!(controller.status().await, Phase::Failed);
    }

    let report = controller.results().await?;
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.stderr.trim(), "oops");
    assert!(report.error.is_none());
    Ok(())
}

#[tokio::test]
#[serial]
async fn second_start_is_rejected_while_running() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    let pid = controller.results().await?.pid;

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, ToolboxError::AlreadyRunning(ToolId::Chkrootkit)));
    assert_eq!(controller.results().await?.pid, pid);
    assert_eq!(controller.status().await, Phase::Running);

    controller.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_starts_admit_exactly_one() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    let (first, second) = tokio::join!(
        tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.start().await }
        }),
        tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.start().await }
        }),
    );
    let outcomes = [first?, second?];

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(ToolboxError::AlreadyRunning(_))))
    );

    controller.stop().await?;
    assert_eq!(controller.status().await, Phase::Stopped);
    Ok(())
}

#[tokio::test]
#[serial]
async fn results_are_partial_while_running() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    wait_for_output(&controller, "started").await?;

    let report = controller.results().await?;
    assert_eq!(report.phase, Phase::Running);
    assert!(report.pid.is_some());
    assert!(report.exit_code.is_none());
    assert!(report.termination.is_none());

    controller.stop().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn stop_terminates_and_is_idempotent() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.stop().await?;
    assert_eq!(controller.status().await, Phase::Idle);

    controller.start().await?;
    wait_for_output(&controller, "started").await?;
    controller.stop().await?;
    assert_eq!(controller.status().await, Phase::Stopped);

    let report = controller.results().await?;
    assert_eq!(report.termination, Some(Termination::Killed));
    assert_eq!(report.stdout.trim(), "started");

    controller.stop().await?;
    assert_eq!(controller.status().await, Phase::Stopped);
    Ok(())
}

#[tokio::test]
#[serial]
async fn stopped_tool_can_run_again() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    let first = controller.results().await?.pid.context("first run has no pid")?;
    controller.stop().await?;

    controller.start().await?;
    let report = controller.results().await?;
    assert_eq!(report.phase, Phase::Running);
    assert_ne!(report.pid, Some(first));
    assert!(report.termination.is_none());

    controller.stop().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn timed_out_run_is_failed() -> Result<()> {
    let root = TempDir::new()?;
    let programs = ToolPrograms {
        chkrootkit: write_script(root.path(), "chkrootkit", SLOW_TOOL)?,
        ..ToolPrograms::default()
    };
    let config = ToolsConfig {
        run_timeout_seconds: 1,
        ..tools_config(&root, programs)
    };
    let registry = ToolRegistry::new(&config);
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    assert_eq!(wait_for_terminal(&controller).await?, Phase::Failed);

    let report = controller.results().await?;
    assert!(report.timed_out);
    assert_eq!(report.error.as_deref(), Some("run timed out"));
    assert_eq!(report.termination, Some(Termination::Killed));
    Ok(())
}

#[tokio::test]
#[serial]
async fn find_with_empty_directory_never_spawns() -> Result<()> {
    let root = TempDir::new()?;
    let registry = ToolRegistry::new(&tools_config(&root, ToolPrograms::default()));
    let find = registry.resolve("find")?;

    find.configure(ToolParams::Find(FindParams {
        directory: String::new(),
        name_pattern: "*.so".to_string(),
    }))
    .await;
    let err = find.start().await.unwrap_err();

    assert!(matches!(err, ToolboxError::InvalidParameters(_)));
    assert_eq!(find.status().await, Phase::Failed);
    let report = find.results().await?;
    assert!(report.pid.is_none());
    assert!(report.command.is_empty());
    Ok(())
}

#[tokio::test]
#[serial]
async fn tools_run_independently() -> Result<()> {
    let root = TempDir::new()?;
    let search = root.path().join("search");
    fs::create_dir_all(search.join("nested"))?;
    fs::write(search.join("nested").join("libevil.so"), "")?;

    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let chkrootkit = registry.controller(ToolId::Chkrootkit);
    let find = registry.controller(ToolId::Find);

    chkrootkit.start().await?;
    find.configure(ToolParams::Find(FindParams {
        directory: search.to_string_lossy().into_owned(),
        name_pattern: "*.so".to_string(),
    }))
    .await;
    find.start().await?;

    assert_eq!(wait_for_terminal(&find).await?, Phase::Completed);
    assert!(find.results().await?.stdout.contains("libevil.so"));
    assert_eq!(chkrootkit.status().await, Phase::Running);

    chkrootkit.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn controller_answers_while_stop_waits_out_grace_period() -> Result<()> {
    let root = TempDir::new()?;
    let programs = ToolPrograms {
        chkrootkit: write_script(root.path(), "chkrootkit", STUBBORN_TOOL)?,
        ..ToolPrograms::default()
    };
    let config = ToolsConfig {
        grace_period_ms: 1_000,
        ..tools_config(&root, programs)
    };
    let registry = ToolRegistry::new(&config);
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    wait_for_output(&controller, "started").await?;

    let stopping = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.stop().await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let asked = Instant::now();
    assert_eq!(controller.status().await, Phase::Running);
    assert_eq!(controller.results().await?.phase, Phase::Running);
    assert!(matches!(
        controller.start().await,
        Err(ToolboxError::AlreadyRunning(ToolId::Chkrootkit))
    ));
    assert!(asked.elapsed() < Duration::from_millis(500), "{:?}", asked.elapsed());
    assert!(!stopping.is_finished());

    stopping.await??;
    assert_eq!(controller.status().await, Phase::Stopped);
    let report = controller.results().await?;
    assert_eq!(report.termination, Some(Termination::Killed));
    assert_eq!(report.signal, Some(SIGKILL));
    Ok(())
}

/// A pid counts as gone once it is missing from /proc or only a zombie.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rsplit_once(") ")
        .and_then(|(_, rest)| rest.chars().next())
        .is_some_and(|state| !matches!(state, 'Z' | 'X'))
}

#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn dropping_registry_kills_live_run() -> Result<()> {
    let root = TempDir::new()?;
    let registry = chkrootkit_registry(&root, SLOW_TOOL)?;
    let controller = registry.controller(ToolId::Chkrootkit);

    controller.start().await?;
    wait_for_output(&controller, "started").await?;
    let pid = controller.results().await?.pid.context("run has no pid")?;
    assert!(process_alive(pid));

    drop(controller);
    drop(registry);

    let deadline = Instant::now() + Duration::from_secs(5);
    while process_alive(pid) {
        if Instant::now() > deadline {
            bail!("pid {pid} survived registry teardown");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}
