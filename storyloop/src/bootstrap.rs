//! One-time setup before the first iteration.
//!
//! Order matters: prerequisites are checked before anything touches the
//! repository, and the task list is validated before a branch is created for
//! it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::{debug, info};

use crate::branch::{BranchSetup, branch_name_for, ensure_branch};
use crate::io::config::LoopConfig;
use crate::io::git::Git;
use crate::io::prereqs::{Prerequisites, check_prerequisites};
use crate::io::progress::{ProgressPrep, prepare_progress_log, read_progress};
use crate::io::prompt::load_instructions;
use crate::io::task_store::load_task_list;

/// Contents of the state directory's `.gitignore`: ignore everything,
/// including the `.gitignore` itself, so runner artifacts never show up as
/// working-tree changes.
const STATE_GITIGNORE: &str = "*\n";

/// Resolved paths for one project root.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub task_list: PathBuf,
    pub progress: PathBuf,
    pub state_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub state_gitignore: PathBuf,
    pub instructions: Option<PathBuf>,
}

impl RunPaths {
    /// Resolve configured paths against `root` (absolute paths are kept).
    pub fn new(root: impl Into<PathBuf>, config: &LoopConfig) -> Self {
        let root = root.into();
        let state_dir = root.join(&config.paths.state_dir);
        Self {
            task_list: root.join(&config.paths.task_list),
            progress: root.join(&config.paths.progress),
            archive_dir: state_dir.join("archive"),
            iterations_dir: state_dir.join("iterations"),
            state_gitignore: state_dir.join(".gitignore"),
            instructions: config.paths.instructions.as_ref().map(|p| root.join(p)),
            state_dir,
            root,
        }
    }
}

/// Result of run setup.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub run_id: String,
    pub branch: BranchSetup,
    pub progress: ProgressPrep,
    /// Skeleton written this run when no progress log existed. While the
    /// untracked log still holds exactly this text it is not a change.
    pub fresh_progress: Option<String>,
    pub instructions: String,
}

/// Executables the run depends on for this configuration.
pub fn required_programs(config: &LoopConfig) -> Vec<&str> {
    let assistant = if config.sandbox {
        config
            .oracle
            .sandbox_command
            .first()
            .map_or(config.oracle.program.as_str(), String::as_str)
    } else {
        config.oracle.program.as_str()
    };
    vec!["git", assistant]
}

/// Prepare a run: prerequisites, task list validation, branch, state
/// directory, progress log, instructions.
pub fn bootstrap_run(paths: &RunPaths, config: &LoopConfig) -> Result<Bootstrap> {
    debug!(root = %paths.root.display(), "bootstrapping run");
    check_prerequisites(&Prerequisites {
        programs: required_programs(config),
        files: vec![&paths.task_list],
    })?;
    if let Some(instructions) = &paths.instructions {
        check_prerequisites(&Prerequisites {
            programs: Vec::new(),
            files: vec![instructions],
        })?;
    }

    let list = load_task_list(&paths.task_list)?;
    let branch_name = branch_name_for(&list)?;
    let git = Git::new(&paths.root);
    let branch = ensure_branch(&git, &branch_name)?;

    ensure_state_dir(paths)?;
    let progress = prepare_progress_log(&paths.progress, &paths.archive_dir)?;
    let fresh_progress = match progress {
        ProgressPrep::Created => Some(read_progress(&paths.progress)?),
        ProgressPrep::Archived(_) => None,
    };
    let instructions = load_instructions(paths.instructions.as_deref())?;
    let run_id = unique_run_id(&paths.iterations_dir)?;

    let (done, total) = list.progress();
    info!(run_id = %run_id, branch = %branch.branch(), done, total, "run bootstrapped");
    Ok(Bootstrap {
        run_id,
        branch,
        progress,
        fresh_progress,
        instructions,
    })
}

/// Create the state directory and its ignore-everything `.gitignore`.
pub fn ensure_state_dir(paths: &RunPaths) -> Result<()> {
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create state dir {}", paths.state_dir.display()))?;
    let existing = fs::read_to_string(&paths.state_gitignore).unwrap_or_default();
    if existing != STATE_GITIGNORE {
        fs::write(&paths.state_gitignore, STATE_GITIGNORE)
            .with_context(|| format!("write {}", paths.state_gitignore.display()))?;
    }
    Ok(())
}

/// `run-<YYYYmmdd_HHMMSS>`, suffixed when a run with that id already logged.
fn unique_run_id(iterations_dir: &Path) -> Result<String> {
    let base = format!("run-{}", Local::now().format("%Y%m%d_%H%M%S"));
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        if !iterations_dir.join(&id).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to generate unique run id from base '{base}'"
    ))
}
