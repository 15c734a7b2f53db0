//! Version-control seam used by every store component.
//!
//! Operations take the repository (or worktree) directory explicitly because a
//! single store call touches three of them: the source repository, the bare
//! mirror and an environment worktree.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path relative to the worktree root. Untracked directories end in `/`.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    pub fn is_deleted(&self) -> bool {
        self.code.contains('D')
    }

    /// Newly added to the index.
    pub fn is_staged_add(&self) -> bool {
        self.code.starts_with('A')
    }
}

/// Result of a fetch with explicit refspecs.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Updated,
    /// The destination ref diverged and git refused the non-fast-forward update.
    Rejected,
}

impl FetchOutcome {
    /// Fail on a rejected fetch of `what`.
    pub fn require_updated(self, what: &str) -> Result<()> {
        match self {
            Self::Updated => Ok(()),
            Self::Rejected => Err(anyhow!("fetch of {what} was rejected as non-fast-forward")),
        }
    }
}

/// Where a new worktree's branch comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeStart<'a> {
    /// Check out a branch that already exists in the repository.
    Existing(&'a str),
    /// Create `branch` at `start_point` and check it out.
    NewBranch { branch: &'a str, start_point: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Merge commit that keeps the environment's history (`--no-ff`).
    PreserveHistory,
    /// Stage the combined changes without committing (`--squash`).
    Squash,
    /// Move the current branch forward only (`--ff-only`).
    FastForward,
}

/// A local branch and the commit it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    pub name: String,
    pub commit: String,
}

pub trait VcsBackend: Send + Sync {
    fn clone_bare(&self, source: &Path, dest: &Path) -> Result<()>;
    /// Top-level directory of the repository containing `dir`.
    fn toplevel(&self, dir: &Path) -> Result<PathBuf>;

    /// URL of `remote`, or `None` when the remote is not configured.
    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>>;
    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<()>;
    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<()>;
    fn prune_remote(&self, repo: &Path, remote: &str) -> Result<()>;

    fn fetch(&self, repo: &Path, remote: &str, refspecs: &[&str]) -> Result<FetchOutcome>;
    fn push_force(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Checked-out branch, or `None` on a detached HEAD.
    fn current_branch(&self, repo: &Path) -> Result<Option<String>>;
    fn ref_exists(&self, repo: &Path, refname: &str) -> Result<bool>;
    fn resolve_commit(&self, repo: &Path, rev: &str) -> Result<Option<String>>;
    fn delete_ref(&self, repo: &Path, refname: &str) -> Result<()>;

    fn list_branches(&self, repo: &Path) -> Result<Vec<BranchTip>>;
    fn create_tracking_branch(&self, repo: &Path, branch: &str, upstream: &str) -> Result<()>;
    fn delete_branch(&self, repo: &Path, branch: &str) -> Result<()>;

    fn add_worktree(&self, repo: &Path, path: &Path, start: WorktreeStart<'_>) -> Result<()>;
    fn prune_worktrees(&self, repo: &Path) -> Result<()>;

    fn status(&self, dir: &Path) -> Result<Vec<StatusEntry>>;
    /// Untracked, non-ignored files (never directories).
    fn untracked_files(&self, dir: &Path) -> Result<Vec<String>>;
    fn stage(&self, dir: &Path, paths: &[String]) -> Result<()>;
    fn has_staged_changes(&self, dir: &Path) -> Result<bool>;
    fn commit(&self, dir: &Path, message: &str) -> Result<()>;

    /// `git diff --binary HEAD`: tracked changes, staged or not.
    fn diff_head_binary(&self, dir: &Path) -> Result<Vec<u8>>;
    fn apply_patch(&self, dir: &Path, patch: &[u8]) -> Result<()>;

    /// Replace the note on `commit` with `content`.
    fn notes_add_force(&self, dir: &Path, notes_ref: &str, commit: &str, content: &str)
    -> Result<()>;
    fn notes_append(&self, dir: &Path, notes_ref: &str, commit: &str, message: &str) -> Result<()>;
    /// Note attached to `commit`, or `None` when there is none.
    fn notes_show(&self, dir: &Path, notes_ref: &str, commit: &str) -> Result<Option<String>>;
    /// Commits annotated on `notes_ref`.
    fn notes_list(&self, dir: &Path, notes_ref: &str) -> Result<Vec<String>>;

    fn log(&self, dir: &Path, revision: &str, patch: bool, notes_refs: &[&str]) -> Result<String>;
    fn diff_range(&self, dir: &Path, range: &str) -> Result<String>;
    fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;
    fn merge(&self, dir: &Path, branch: &str, mode: MergeMode) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, path: &str) -> StatusEntry {
        StatusEntry {
            code: code.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn status_entry_predicates() {
        assert!(entry("??", "new.txt").is_untracked());
        assert!(entry(" D", "gone.txt").is_deleted());
        assert!(entry("D ", "gone.txt").is_deleted());
        assert!(entry("A ", "added.txt").is_staged_add());
        assert!(!entry(" M", "changed.txt").is_staged_add());
        assert!(!entry(" M", "changed.txt").is_deleted());
    }

    #[test]
    fn rejected_fetch_is_an_error() {
        assert!(FetchOutcome::Updated.require_updated("web/quick-fox").is_ok());
        let err = FetchOutcome::Rejected
            .require_updated("web/quick-fox")
            .unwrap_err();
        assert!(err.to_string().contains("web/quick-fox"), "{err:#}");
    }
}
