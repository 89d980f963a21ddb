use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Settings shared by every tool controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Directory holding YARA rulesets. Bare ruleset names resolve here.
    #[serde(default = "ToolsConfig::default_rules_dir")]
    pub rules_dir: PathBuf,
    /// Milliseconds between SIGTERM and SIGKILL when a run is stopped.
    #[serde(default = "ToolsConfig::default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Wall-clock limit (in seconds) for a single run. `0` disables it.
    #[serde(default)]
    pub run_timeout_seconds: u64,
    /// Cap on captured bytes, applied to stdout and stderr separately.
    #[serde(default = "ToolsConfig::default_output_limit_bytes")]
    pub output_limit_bytes: usize,
    /// Executables launched for each tool.
    #[serde(default)]
    pub programs: ToolPrograms,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rules_dir: Self::default_rules_dir(),
            grace_period_ms: Self::default_grace_period_ms(),
            run_timeout_seconds: 0,
            output_limit_bytes: Self::default_output_limit_bytes(),
            programs: ToolPrograms::default(),
        }
    }
}

impl ToolsConfig {
    const MIN_GRACE_PERIOD_MS: u64 = 10;
    const MAX_GRACE_PERIOD_MS: u64 = 60_000;
    const MIN_OUTPUT_LIMIT_BYTES: usize = 1_024;

    fn default_rules_dir() -> PathBuf {
        PathBuf::from("yara_rules")
    }

    const fn default_grace_period_ms() -> u64 {
        500
    }

    const fn default_output_limit_bytes() -> usize {
        8 * 1024 * 1024
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Normalize the configured timeout into an optional duration.
    pub fn run_timeout(&self) -> Option<Duration> {
        if self.run_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.run_timeout_seconds))
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (Self::MIN_GRACE_PERIOD_MS..=Self::MAX_GRACE_PERIOD_MS).contains(&self.grace_period_ms),
            "tools.grace_period_ms must be between {} and {}",
            Self::MIN_GRACE_PERIOD_MS,
            Self::MAX_GRACE_PERIOD_MS
        );
        ensure!(
            self.output_limit_bytes >= Self::MIN_OUTPUT_LIMIT_BYTES,
            "tools.output_limit_bytes must be at least {} bytes",
            Self::MIN_OUTPUT_LIMIT_BYTES
        );
        ensure!(
            !self.rules_dir.as_os_str().is_empty(),
            "tools.rules_dir must not be empty"
        );
        self.programs.validate()
    }
}

/// Program names (or absolute paths) for each supported tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolPrograms {
    #[serde(default = "ToolPrograms::default_yara")]
    pub yara: String,
    #[serde(default = "ToolPrograms::default_chkrootkit")]
    pub chkrootkit: String,
    #[serde(default = "ToolPrograms::default_find")]
    pub find: String,
}

impl Default for ToolPrograms {
    fn default() -> Self {
        Self {
            yara: Self::default_yara(),
            chkrootkit: Self::default_chkrootkit(),
            find: Self::default_find(),
        }
    }
}

impl ToolPrograms {
    fn default_yara() -> String {
        "yara".to_string()
    }

    fn default_chkrootkit() -> String {
        "chkrootkit".to_string()
    }

    fn default_find() -> String {
        "find".to_string()
    }

    fn validate(&self) -> Result<()> {
        for (key, program) in [
            ("yara", &self.yara),
            ("chkrootkit", &self.chkrootkit),
            ("find", &self.find),
        ] {
            ensure!(
                !program.trim().is_empty(),
                "tools.programs.{key} must not be empty"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ToolsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_period(), Duration::from_millis(500));
        assert_eq!(config.programs.find, "find");
    }

    #[test]
    fn zero_timeout_disables_limit() {
        let mut config = ToolsConfig::default();
        assert_eq!(config.run_timeout(), None);

        config.run_timeout_seconds = 30;
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_out_of_range_grace_period() {
        let config = ToolsConfig {
            grace_period_ms: 1,
            ..ToolsConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grace_period_ms"));
    }

    #[test]
    fn rejects_blank_program() {
        let mut config = ToolsConfig::default();
        config.programs.chkrootkit = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tools.programs.chkrootkit"));
    }
}
