//! Loop configuration stored in `storyloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, relative to the project root.
pub const CONFIG_FILE: &str = "storyloop.toml";

/// Loop configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults
/// below. CLI flags override the loaded values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Iteration budget when none is given on the command line.
    pub max_iterations: u32,

    /// Pause between iterations, in seconds.
    pub pause_secs: u64,

    /// Run the assistant inside `oracle.sandbox_command`.
    pub sandbox: bool,

    /// Ask the assistant for a JSON reply envelope (`oracle.structured_args`).
    pub structured_output: bool,

    pub paths: PathsConfig,

    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Story checklist, relative to the root.
    pub task_list: PathBuf,
    /// Progress log shared with the assistant.
    pub progress: PathBuf,
    /// Runner-owned directory for iteration logs and archives.
    pub state_dir: PathBuf,
    /// Instruction template appended to every prompt. Built-in text when unset.
    pub instructions: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Assistant executable.
    pub program: String,
    /// Arguments always passed (print mode, auto-approval).
    pub args: Vec<String>,
    /// Extra arguments selecting the JSON reply envelope.
    pub structured_args: Vec<String>,
    /// Launcher prepended to the command in sandbox mode.
    pub sandbox_command: Vec<String>,
    /// Kill the assistant after this many seconds. Unbounded when unset.
    pub timeout_secs: Option<u64>,
    /// Bytes of each stream kept in the iteration transcript (stdout keeps its
    /// tail). Classification always sees the full reply.
    pub output_limit_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            pause_secs: 2,
            sandbox: false,
            structured_output: false,
            paths: PathsConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            task_list: PathBuf::from("prd.json"),
            progress: PathBuf::from("progress.txt"),
            state_dir: PathBuf::from(".storyloop"),
            instructions: None,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
            structured_args: vec!["--output-format".to_string(), "json".to_string()],
            sandbox_command: vec![
                "docker".to_string(),
                "sandbox".to_string(),
                "run".to_string(),
            ],
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.oracle.program.trim().is_empty() {
            return Err(anyhow!("oracle.program must not be empty"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.oracle.timeout_secs == Some(0) {
            return Err(anyhow!("oracle.timeout_secs must be > 0 when set"));
        }
        if self.sandbox && self.oracle.sandbox_command.is_empty() {
            return Err(anyhow!(
                "sandbox mode requires a non-empty oracle.sandbox_command"
            ));
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn oracle_timeout(&self) -> Option<Duration> {
        self.oracle.timeout_secs.map(Duration::from_secs)
    }
}

/// Command-line settings that take precedence over the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_iterations: Option<u32>,
    pub sandbox: Option<bool>,
    pub structured_output: bool,
}

impl LoopConfig {
    /// Fold in command-line overrides, then validate the result.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(iterations) = overrides.max_iterations {
            self.max_iterations = iterations;
        }
        if let Some(sandbox) = overrides.sandbox {
            self.sandbox = sandbox;
        }
        if overrides.structured_output {
            self.structured_output = true;
        }
        self.validate()?;
        Ok(self)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`. Values are checked
/// by [`LoopConfig::with_overrides`], once the command line has been applied.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        return Ok(LoopConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
