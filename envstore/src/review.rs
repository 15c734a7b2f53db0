//! Bringing an environment's work back into the source repository.
//!
//! Every operation first refreshes `container-use/<id>` in the source so it
//! sees the latest save.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::types::{LOG_NOTES_REF, MIRROR_REMOTE, RepoBinding};
use crate::error::StoreError;
use crate::io::vcs::{MergeMode, VcsBackend};

fn refresh<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<String> {
    if !vcs.ref_exists(&binding.mirror_path, &format!("refs/heads/{id}"))? {
        return Err(StoreError::EnvironmentNotFound(id.to_string()).into());
    }
    vcs.fetch(&binding.source_path, MIRROR_REMOTE, &[id])
        .with_context(|| format!("fetch {id} into source"))?
        .require_updated(id)?;
    Ok(binding.tracking_ref(id))
}

/// Commit log of the environment branch, annotated with its log notes.
pub fn log<B: VcsBackend + ?Sized>(
    vcs: &B,
    binding: &RepoBinding,
    id: &str,
    patch: bool,
) -> Result<String> {
    let tracking = refresh(vcs, binding, id)?;
    vcs.log(&binding.source_path, &tracking, patch, &[LOG_NOTES_REF])
}

/// Changes the environment made since it diverged from the current HEAD.
pub fn diff<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<String> {
    let tracking = refresh(vcs, binding, id)?;
    vcs.diff_range(&binding.source_path, &format!("HEAD...{tracking}"))
}

/// Switch the source repository to branch `<id>`, creating it if needed and
/// fast-forwarding it to the latest save.
#[instrument(skip_all, fields(environment.id = id))]
pub fn checkout<B: VcsBackend + ?Sized>(
    vcs: &B,
    binding: &RepoBinding,
    id: &str,
) -> Result<String> {
    let tracking = refresh(vcs, binding, id)?;
    let source = &binding.source_path;
    if !vcs.ref_exists(source, &format!("refs/heads/{id}"))? {
        vcs.create_tracking_branch(source, id, &tracking)?;
    }
    vcs.checkout(source, id)?;
    vcs.merge(source, &tracking, MergeMode::FastForward)
        .with_context(|| format!("fast-forward {id} to {tracking}"))?;
    info!("checked out environment branch");
    Ok(id.to_string())
}

/// Merge the environment into the current branch, keeping its commits.
#[instrument(skip_all, fields(environment.id = id))]
pub fn merge<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<()> {
    let tracking = refresh(vcs, binding, id)?;
    vcs.merge(&binding.source_path, &tracking, MergeMode::PreserveHistory)
        .with_context(|| format!("merge {id}"))
}

/// Stage the environment's combined changes without committing.
#[instrument(skip_all, fields(environment.id = id))]
pub fn apply<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<()> {
    let tracking = refresh(vcs, binding, id)?;
    vcs.merge(&binding.source_path, &tracking, MergeMode::Squash)
        .with_context(|| format!("apply {id}"))
}
