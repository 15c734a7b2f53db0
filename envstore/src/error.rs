//! Typed failures that callers match on.
//!
//! Orchestration code propagates `anyhow::Error` with context; the variants here
//! are the ones a caller can meaningfully react to, recovered with
//! `err.downcast_ref::<StoreError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Environment name rejected before any git state was touched.
    #[error("invalid environment name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Creating the mirror or wiring the remote between source and mirror failed.
    #[error("unable to set up mirror {} for {}: {reason}", mirror.display(), source_repo.display())]
    MirrorSetup {
        source_repo: PathBuf,
        mirror: PathBuf,
        reason: String,
    },

    /// Replaying the user's uncommitted changes into a fresh worktree failed.
    #[error("failed to apply uncommitted changes to {}: {output}", worktree.display())]
    PatchApply { worktree: PathBuf, output: String },

    /// A git subprocess exited unsuccessfully.
    #[error("git {args} failed in {} (exit code {code:?}): {output}", dir.display())]
    GitCommand {
        dir: PathBuf,
        args: String,
        code: Option<i32>,
        output: String,
    },

    /// The caller's deadline expired before or during a subprocess call.
    #[error("deadline exceeded while running {operation}")]
    DeadlineExceeded { operation: String },

    /// The source repository is not on a branch.
    #[error("{} is on a detached HEAD (check out a branch first)", repo.display())]
    DetachedHead { repo: PathBuf },

    #[error("environment '{0}' not found")]
    EnvironmentNotFound(String),

    /// Every generated id collided with an existing branch or worktree.
    #[error("unable to generate a unique id for environment '{0}'")]
    IdExhausted(String),
}
