//! Replay a source repository's uncommitted changes into a new worktree.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::io::commit::commit_all;
use crate::io::vcs::VcsBackend;

pub const REPLAY_TITLE: &str = "Copy uncommitted changes";
const REPLAY_DESCRIPTION: &str = "Applied uncommitted changes from local repository";

/// Carry tracked edits (as a binary diff) and untracked files from `source`
/// into `worktree`, then commit them there.
///
/// A patch that does not apply fails with [`StoreError::PatchApply`].
#[instrument(skip_all, fields(source = %source.display(), worktree = %worktree.display()))]
pub fn apply_uncommitted_changes<B: VcsBackend + ?Sized>(
    vcs: &B,
    source: &Path,
    worktree: &Path,
) -> Result<bool> {
    if vcs.status(source)?.is_empty() {
        debug!("source clean, nothing to replay");
        return Ok(false);
    }

    let patch = vcs.diff_head_binary(source)?;
    if !patch.is_empty() {
        apply_patch_bytes(vcs, worktree, &patch)?;
    }

    let untracked = vcs.untracked_files(source)?;
    for rel in &untracked {
        copy_preserving(&source.join(rel), &worktree.join(rel))
            .with_context(|| format!("copy untracked file {rel}"))?;
    }
    info!(patch_bytes = patch.len(), untracked = untracked.len(), "replayed uncommitted changes");

    commit_all(vcs, worktree, REPLAY_TITLE, REPLAY_DESCRIPTION)
}

/// Apply `patch` in `worktree`, mapping failure to [`StoreError::PatchApply`].
pub fn apply_patch_bytes<B: VcsBackend + ?Sized>(
    vcs: &B,
    worktree: &Path,
    patch: &[u8],
) -> Result<()> {
    vcs.apply_patch(worktree, patch).map_err(|err| {
        let output = match err.downcast_ref::<StoreError>() {
            Some(StoreError::GitCommand { output, .. }) => output.clone(),
            _ => format!("{err:#}"),
        };
        StoreError::PatchApply {
            worktree: worktree.to_path_buf(),
            output,
        }
        .into()
    })
}

fn copy_preserving(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let meta = fs::symlink_metadata(from).with_context(|| format!("stat {}", from.display()))?;
    if meta.file_type().is_symlink() {
        return copy_symlink(from, to);
    }
    fs::copy(from, to).with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from).with_context(|| format!("read link {}", from.display()))?;
    if fs::symlink_metadata(to).is_ok() {
        fs::remove_file(to).with_context(|| format!("replace {}", to.display()))?;
    }
    std::os::unix::fs::symlink(&target, to).with_context(|| format!("symlink {}", to.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}
