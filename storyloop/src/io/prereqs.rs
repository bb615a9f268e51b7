//! Pre-loop checks for required tools and inputs.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::debug;

/// A required tool or input file is missing. Detected before the first iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPrerequisiteError {
    pub missing: Vec<String>,
}

impl fmt::Display for MissingPrerequisiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing prerequisites: {}", self.missing.join("; "))
    }
}

impl std::error::Error for MissingPrerequisiteError {}

/// What the run needs before it can start.
#[derive(Debug, Clone)]
pub struct Prerequisites<'a> {
    /// Executables that must resolve (bare names via `PATH`, or paths).
    pub programs: Vec<&'a str>,
    /// Files that must exist.
    pub files: Vec<&'a Path>,
}

/// Check every prerequisite and report all missing ones at once.
pub fn check_prerequisites(prereqs: &Prerequisites<'_>) -> Result<()> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = env::split_paths(&path_var).collect();

    let mut missing = Vec::new();
    for program in &prereqs.programs {
        match find_program(program, &dirs) {
            Some(found) => debug!(program, path = %found.display(), "found program"),
            None => missing.push(format!("'{program}' not found on PATH")),
        }
    }
    for file in &prereqs.files {
        if !file.is_file() {
            missing.push(format!("{} does not exist", file.display()));
        }
    }

    if missing.is_empty() {
        return Ok(());
    }
    Err(anyhow!(MissingPrerequisiteError { missing }))
}

/// Resolve `program` to a file: directly if it contains a path separator,
/// otherwise by searching `dirs` in order.
pub fn find_program(program: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    dirs.iter()
        .map(|dir| dir.join(OsStr::new(program)))
        .find(|path| path.is_file())
}
