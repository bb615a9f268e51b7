//! Pre-loop branch setup.
//!
//! Checkpoints land on a dedicated branch named by the task list. Setup runs
//! once per run: stay if already there, switch if it exists, create it at HEAD
//! otherwise.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::core::types::TaskList;
use crate::io::git::Git;

/// What branch setup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSetup {
    AlreadyOn(String),
    CheckedOut(String),
    Created(String),
}

impl BranchSetup {
    pub fn branch(&self) -> &str {
        match self {
            BranchSetup::AlreadyOn(b) | BranchSetup::CheckedOut(b) | BranchSetup::Created(b) => b,
        }
    }
}

/// Branch for a task list: `branchName` if set, else `storyloop/<slug of name>`.
pub fn branch_name_for(list: &TaskList) -> Result<String> {
    if let Some(name) = list.branch_name.as_deref().map(str::trim)
        && !name.is_empty()
    {
        return Ok(name.to_string());
    }
    let slug = slugify(&list.name);
    if slug.is_empty() {
        return Err(anyhow!(
            "task list has no branchName and its name '{}' yields an empty branch slug",
            list.name
        ));
    }
    Ok(format!("storyloop/{slug}"))
}

/// Ensure `branch` is checked out, creating it from HEAD if needed.
pub fn ensure_branch(git: &Git, branch: &str) -> Result<BranchSetup> {
    let current = git.current_branch()?;
    if current.as_deref() == Some(branch) {
        debug!(branch, "already on branch");
        return Ok(BranchSetup::AlreadyOn(branch.to_string()));
    }
    if git.branch_exists(branch)? {
        git.checkout_branch(branch)
            .with_context(|| format!("checkout existing branch {branch}"))?;
        info!(branch, "switched to branch");
        return Ok(BranchSetup::CheckedOut(branch.to_string()));
    }
    git.checkout_new_branch(branch)
        .with_context(|| format!("create branch {branch}"))?;
    info!(branch, "created branch");
    Ok(BranchSetup::Created(branch.to_string()))
}

/// Lowercase ASCII alphanumerics, everything else collapsed to single dashes.
fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestRepo, task_list};

    #[test]
    fn explicit_branch_name_wins() {
        let mut list = task_list(Vec::new());
        list.branch_name = Some("feature/cart".to_string());
        assert_eq!(branch_name_for(&list).expect("name"), "feature/cart");
    }

    #[test]
    fn branch_derived_from_project_name() {
        let mut list = task_list(Vec::new());
        list.name = "  My Shop: Cart & Checkout!! ".to_string();
        assert_eq!(
            branch_name_for(&list).expect("name"),
            "storyloop/my-shop-cart-checkout"
        );

        list.name = "!!!".to_string();
        assert!(branch_name_for(&list).is_err());
    }

    #[test]
    fn ensure_branch_creates_then_reuses() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        let original = git.current_branch().expect("branch").expect("attached");

        let first = ensure_branch(&git, "storyloop/demo").expect("create");
        assert_eq!(first, BranchSetup::Created("storyloop/demo".to_string()));

        let second = ensure_branch(&git, "storyloop/demo").expect("stay");
        assert_eq!(second, BranchSetup::AlreadyOn("storyloop/demo".to_string()));

        git.checkout_branch(&original).expect("back");
        let third = ensure_branch(&git, "storyloop/demo").expect("switch");
        assert_eq!(third, BranchSetup::CheckedOut("storyloop/demo".to_string()));
        assert_eq!(third.branch(), "storyloop/demo");
    }
}
