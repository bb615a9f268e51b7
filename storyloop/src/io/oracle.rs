//! Oracle abstraction for assistant invocation.
//!
//! The [`Oracle`] trait decouples the loop from the actual assistant CLI
//! (by default `claude --print`). Tests use scripted oracles that return
//! canned replies without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::config::OracleConfig;
use crate::io::process::{RunOptions, run_command};

/// Parameters for one assistant invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// Working directory for the assistant process.
    pub workdir: PathBuf,
    /// Prompt text, delivered on stdin.
    pub prompt: String,
    /// Wrap the command in the configured sandbox launcher.
    pub sandbox: bool,
    /// Request the JSON reply envelope and unwrap it before classification.
    pub structured: bool,
    /// Echo assistant stdout to the terminal while it runs.
    pub echo: bool,
    /// Kill the assistant after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Bytes of each stream kept in the transcript. The reply text itself is
    /// never cut.
    pub output_limit_bytes: usize,
}

/// What the assistant said and how it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReply {
    /// Reply text to classify (envelope already unwrapped).
    pub text: String,
    /// Full stdout/stderr transcript for the iteration log.
    pub transcript: String,
    /// Exit code; `None` when killed by a signal or the timeout.
    pub exit_code: Option<i32>,
}

impl OracleReply {
    /// True for a clean zero exit.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Abstraction over assistant backends.
pub trait Oracle {
    /// Run the assistant to completion. A non-zero exit is a reply, not an error;
    /// errors mean the assistant could not be run at all.
    fn invoke(&self, request: &OracleRequest) -> Result<OracleReply>;
}

/// Oracle that spawns a command-line assistant.
pub struct CliOracle {
    config: OracleConfig,
}

impl CliOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }
}

impl Oracle for CliOracle {
    #[instrument(skip_all, fields(program = %self.config.program, sandbox = request.sandbox, structured = request.structured))]
    fn invoke(&self, request: &OracleRequest) -> Result<OracleReply> {
        info!(workdir = %request.workdir.display(), "starting assistant");

        let cmd = build_command(&self.config, request)?;
        let output = run_command(
            cmd,
            &RunOptions {
                stdin: Some(request.prompt.as_bytes()),
                timeout: request.timeout,
                stderr_limit_bytes: request.output_limit_bytes,
                echo_stdout: request.echo,
            },
        )
        .with_context(|| format!("run {}", self.config.program))?;

        let stdout = output.stdout_text();
        let (stdout_tail, stdout_dropped) = tail_within(&stdout, request.output_limit_bytes);
        let mut transcript = String::new();
        transcript.push_str("=== stdout ===\n");
        if stdout_dropped > 0 {
            transcript.push_str(&format!("[first {stdout_dropped} bytes of stdout omitted]\n"));
        }
        transcript.push_str(stdout_tail);
        transcript.push_str("\n=== stderr ===\n");
        transcript.push_str(&output.stderr_text());
        transcript.push_str(&output.truncated_notice("assistant"));

        let exit_code = if output.timed_out {
            warn!(timeout = ?request.timeout, "assistant timed out");
            transcript.push_str("\n[assistant timed out]\n");
            None
        } else {
            output.exit_code()
        };
        if exit_code != Some(0) {
            warn!(exit_code = ?exit_code, "assistant exited unsuccessfully");
        }

        let text = if request.structured {
            extract_reply_text(&stdout)
        } else {
            stdout
        };
        debug!(reply_bytes = text.len(), "assistant finished");
        Ok(OracleReply {
            text,
            transcript,
            exit_code,
        })
    }
}

/// Build the assistant command line.
///
/// Sandbox mode runs `<sandbox_command...> <program> <args...>`.
pub fn build_command(config: &OracleConfig, request: &OracleRequest) -> Result<Command> {
    let mut argv: Vec<&str> = Vec::new();
    if request.sandbox {
        if config.sandbox_command.is_empty() {
            return Err(anyhow!("sandbox requested but oracle.sandbox_command is empty"));
        }
        argv.extend(config.sandbox_command.iter().map(String::as_str));
    }
    argv.push(config.program.as_str());
    argv.extend(config.args.iter().map(String::as_str));
    if request.structured {
        argv.extend(config.structured_args.iter().map(String::as_str));
    }

    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty assistant command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(&request.workdir);
    Ok(cmd)
}

/// Last `limit` bytes of `text` (on a char boundary) and how many were dropped.
///
/// Markers sit at the end of a reply, so the tail is what the log keeps.
fn tail_within(text: &str, limit: usize) -> (&str, usize) {
    if text.len() <= limit {
        return (text, 0);
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    (&text[start..], start)
}

/// Pull the reply text out of a JSON envelope.
///
/// Accepts a single `{"result": "..."}` object, or a JSON array of events
/// where the last `{"type": "result"}` entry carries the text. Anything else
/// is returned unchanged so markers in plain output are still found.
pub fn extract_reply_text(stdout: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) else {
        return stdout.to_string();
    };
    let result = match &value {
        Value::Object(map) => map.get("result").and_then(Value::as_str),
        Value::Array(events) => events
            .iter()
            .rev()
            .filter(|event| event.get("type").and_then(Value::as_str) == Some("result"))
            .find_map(|event| event.get("result").and_then(Value::as_str)),
        _ => None,
    };
    match result {
        Some(text) => text.to_string(),
        None => stdout.to_string(),
    }
}
