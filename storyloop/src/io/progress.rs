//! Progress log shared with the assistant (`progress.txt`).
//!
//! The loop never edits the log after creating it; the assistant appends its
//! findings and the loop re-injects the whole file into the next prompt.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::{debug, info};

/// What `prepare_progress_log` did with the existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressPrep {
    /// No log existed; a fresh skeleton was written.
    Created,
    /// The existing log was copied to this archive path and left in place.
    Archived(PathBuf),
}

/// Initial progress log content: one section of reusable patterns, one
/// section of per-iteration notes.
pub fn skeleton(started_at: &str) -> String {
    format!(
        "# Progress Log\n\
         Started: {started_at}\n\
         \n\
         ## Codebase Patterns\n\
         \n\
         ## Iteration Log\n\
         \n"
    )
}

/// Archive an existing progress log, or create it from the skeleton.
///
/// Archive copies land in `archive_dir` as `progress-<YYYYmmdd_HHMMSS>.txt`,
/// with a numeric suffix when a copy for the same second already exists.
pub fn prepare_progress_log(path: &Path, archive_dir: &Path) -> Result<ProgressPrep> {
    let now = Local::now();
    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let started_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
        fs::write(path, skeleton(&started_at))
            .with_context(|| format!("write progress log {}", path.display()))?;
        info!(path = %path.display(), "created progress log");
        return Ok(ProgressPrep::Created);
    }

    fs::create_dir_all(archive_dir)
        .with_context(|| format!("create archive dir {}", archive_dir.display()))?;
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    let target = unique_archive_path(archive_dir, &stamp)?;
    fs::copy(path, &target).with_context(|| {
        format!(
            "archive progress log {} to {}",
            path.display(),
            target.display()
        )
    })?;
    info!(archive = %target.display(), "archived progress log");
    Ok(ProgressPrep::Archived(target))
}

/// Read the current progress log. A missing file reads as empty.
pub fn read_progress(path: &Path) -> Result<String> {
    if !path.exists() {
        debug!(path = %path.display(), "progress log missing, using empty text");
        return Ok(String::new());
    }
    fs::read_to_string(path).with_context(|| format!("read progress log {}", path.display()))
}

fn unique_archive_path(dir: &Path, stamp: &str) -> Result<PathBuf> {
    for suffix in 1..=999u32 {
        let name = if suffix == 1 {
            format!("progress-{stamp}.txt")
        } else {
            format!("progress-{stamp}-{suffix}.txt")
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow!(
        "unable to find a free archive name for '{stamp}' in {}",
        dir.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_skeleton_when_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("progress.txt");
        let archive = temp.path().join("archive");

        let prep = prepare_progress_log(&path, &archive).expect("prepare");
        assert_eq!(prep, ProgressPrep::Created);
        let text = read_progress(&path).expect("read");
        assert!(text.contains("## Codebase Patterns"));
        assert!(text.contains("## Iteration Log"));
        assert!(!archive.exists());
    }

    #[test]
    fn archives_existing_log_and_keeps_original() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("progress.txt");
        let archive = temp.path().join("archive");
        fs::write(&path, "learned things\n").expect("write");

        let first = prepare_progress_log(&path, &archive).expect("prepare");
        let second = prepare_progress_log(&path, &archive).expect("prepare again");

        let (ProgressPrep::Archived(a), ProgressPrep::Archived(b)) = (first, second) else {
            panic!("expected archives");
        };
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(&a).expect("read"), "learned things\n");
        assert_eq!(fs::read_to_string(&b).expect("read"), "learned things\n");
        assert_eq!(read_progress(&path).expect("read"), "learned things\n");
    }

    #[test]
    fn missing_log_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_progress(&temp.path().join("none.txt")).expect("read"), "");
    }
}
