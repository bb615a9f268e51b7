//! Iteration logging helpers for `.storyloop/iterations/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::Outcome;

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta {
    pub run_id: String,
    pub iter: u32,
    pub task_id: String,
    pub outcome: &'static str,
    pub blocked_reason: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl IterationMeta {
    pub fn new(
        run_id: &str,
        iter: u32,
        task_id: &str,
        outcome: &Outcome,
        exit_code: Option<i32>,
        duration_ms: u64,
    ) -> Self {
        let blocked_reason = match outcome {
            Outcome::Blocked(reason) => Some(reason.clone()),
            _ => None,
        };
        Self {
            run_id: run_id.to_string(),
            iter,
            task_id: task_id.to_string(),
            outcome: outcome.label(),
            blocked_reason,
            exit_code,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub prompt_path: PathBuf,
    pub reply_path: PathBuf,
}

impl IterationPaths {
    pub fn new(state_dir: &Path, run_id: &str, iter: u32) -> Self {
        let dir = state_dir
            .join("iterations")
            .join(run_id)
            .join(iter.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            prompt_path: dir.join("prompt.md"),
            reply_path: dir.join("reply.txt"),
            dir,
        }
    }
}

pub struct IterationWriteRequest<'a> {
    pub state_dir: &'a Path,
    pub meta: &'a IterationMeta,
    pub prompt: &'a str,
    pub transcript: &'a str,
}

pub fn write_iteration(request: &IterationWriteRequest<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(request.state_dir, &request.meta.run_id, request.meta.iter);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    let mut meta = serde_json::to_string_pretty(request.meta)?;
    meta.push('\n');
    write_text(&paths.meta_path, &meta)?;
    write_text(&paths.prompt_path, request.prompt)?;
    write_text(&paths.reply_path, request.transcript)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
