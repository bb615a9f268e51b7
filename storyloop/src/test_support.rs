//! Test-only helpers: deterministic task lists, scratch git repos, and a
//! scripted oracle.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{Task, TaskList};
use crate::io::config::{LoopConfig, OracleConfig};
use crate::io::oracle::{Oracle, OracleReply, OracleRequest};
use crate::io::task_store::{load_task_list, write_task_list};

/// Create a deterministic task with default fields.
pub fn task(id: &str, done: bool) -> Task {
    Task {
        id: id.to_string(),
        title: format!("{id} title"),
        description: None,
        priority: 0,
        done,
        acceptance_criteria: Vec::new(),
        technical_notes: None,
    }
}

/// Wrap tasks in a list named `demo`.
pub fn task_list(tasks: Vec<Task>) -> TaskList {
    TaskList {
        name: "demo".to_string(),
        branch_name: None,
        description: String::new(),
        tasks,
    }
}

/// Defaults with no pause and a program that is always on `PATH`.
pub fn test_config() -> LoopConfig {
    let defaults = LoopConfig::default();
    LoopConfig {
        pause_secs: 0,
        oracle: OracleConfig {
            program: "sh".to_string(),
            ..defaults.oracle.clone()
        },
        ..defaults
    }
}

/// Temporary git repository with an identity and one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "loop@example.com"])?;
        repo.git(&["config", "user.name", "Loop Test"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.path().join("README.md"), "scratch\n").context("write README")?;
        repo.commit_all("chore: initial commit")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn task_list_path(&self) -> PathBuf {
        self.path().join("prd.json")
    }

    pub fn write_task_list(&self, list: &TaskList) -> Result<()> {
        write_task_list(&self.task_list_path(), list)
    }

    pub fn read_task_list(&self) -> Result<TaskList> {
        load_task_list(&self.task_list_path())
    }

    /// Stage everything and commit (fixture setup only).
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// Commit list plus an existing progress log so a run starts clean.
    pub fn commit_fixture(&self, list: &TaskList) -> Result<()> {
        self.write_task_list(list)?;
        fs::write(self.path().join("progress.txt"), "# Progress Log\n")
            .context("write progress log")?;
        self.commit_all("chore: fixture")
    }

    pub fn head_subject(&self) -> Result<String> {
        Ok(self.git(&["log", "-1", "--format=%s"])?.trim().to_string())
    }

    /// Commit subjects, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        let out = self.git(&["log", "--format=%s"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn commit_count(&self) -> Result<usize> {
        let out = self.git(&["rev-list", "--count", "HEAD"])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse commit count '{}'", out.trim()))
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// One canned oracle turn.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub text: String,
    pub exit_code: Option<i32>,
    /// Files written (relative to the workdir) before replying.
    pub edits: Vec<(PathBuf, String)>,
}

impl ScriptedReply {
    pub fn says(text: &str) -> Self {
        Self {
            text: text.to_string(),
            exit_code: Some(0),
            edits: Vec::new(),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_edit(mut self, path: &str, contents: &str) -> Self {
        self.edits.push((PathBuf::from(path), contents.to_string()));
        self
    }
}

/// Oracle that replays a fixed queue and records the prompts it saw.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<ScriptedReply>>,
    prompts: RefCell<Vec<String>>,
    calls: Cell<usize>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn assert_drained(&self) {
        let left = self.replies.borrow().len();
        assert_eq!(left, 0, "scripted oracle has {left} unused replies");
    }
}

impl Oracle for ScriptedOracle {
    fn invoke(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.calls.set(self.calls.get() + 1);
        self.prompts.borrow_mut().push(request.prompt.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted oracle exhausted after {} calls", self.calls()))?;
        for (path, contents) in &reply.edits {
            let target = request.workdir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&target, contents)
                .with_context(|| format!("write {}", target.display()))?;
        }
        Ok(OracleReply {
            transcript: reply.text.clone(),
            text: reply.text,
            exit_code: reply.exit_code,
        })
    }
}
