//! One mirror worktree per environment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{MIRROR_REMOTE, RepoBinding};
use crate::error::StoreError;
use crate::io::patch::apply_uncommitted_changes;
use crate::io::vcs::{VcsBackend, WorktreeStart};

/// Return the worktree for `id`, creating branch and worktree if needed.
///
/// An existing directory is returned as is. Otherwise the source's current
/// branch is pushed to the mirror, the worktree is added, the source's
/// uncommitted changes are replayed into it, and the source gets a tracking
/// branch `<id>`. Each step tolerates a previous partial run.
#[instrument(skip_all, fields(environment.id = id))]
pub fn materialize<B: VcsBackend + ?Sized>(
    vcs: &B,
    binding: &RepoBinding,
    id: &str,
) -> Result<PathBuf> {
    let path = binding.worktree_path(id);
    if path.exists() {
        debug!(path = %path.display(), "worktree already present");
        return Ok(path);
    }

    let source = &binding.source_path;
    let mirror = &binding.mirror_path;

    vcs.fetch(source, MIRROR_REMOTE, &[])
        .context("fetch mirror into source")?
        .require_updated(MIRROR_REMOTE)?;
    let branch = vcs
        .current_branch(source)?
        .ok_or_else(|| StoreError::DetachedHead {
            repo: source.clone(),
        })?;
    vcs.push_force(source, MIRROR_REMOTE, &branch)
        .with_context(|| format!("push {branch} to mirror"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let start = if vcs.ref_exists(mirror, &format!("refs/heads/{id}"))? {
        WorktreeStart::Existing(id)
    } else {
        WorktreeStart::NewBranch {
            branch: id,
            start_point: &branch,
        }
    };
    // A worktree directory removed by hand stays registered until pruned.
    vcs.prune_worktrees(mirror).context("prune stale worktrees")?;
    info!(path = %path.display(), from = %branch, "adding worktree");
    vcs.add_worktree(mirror, &path, start)
        .with_context(|| format!("add worktree {}", path.display()))?;

    apply_uncommitted_changes(vcs, source, &path)?;

    vcs.fetch(source, MIRROR_REMOTE, &[id])
        .with_context(|| format!("fetch {id} into source"))?
        .require_updated(id)?;
    if !vcs.ref_exists(source, &format!("refs/heads/{id}"))? {
        vcs.create_tracking_branch(source, id, &binding.tracking_ref(id))
            .with_context(|| format!("create tracking branch {id}"))?;
    }
    Ok(path)
}

/// True if either the mirror branch or the worktree of `id` exists.
pub fn exists<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<bool> {
    if binding.worktree_path(id).exists() {
        return Ok(true);
    }
    vcs.ref_exists(&binding.mirror_path, &format!("refs/heads/{id}"))
}

/// Remove the worktree, the mirror branch and the source's stale remote refs.
///
/// Failures are logged and skipped; deleting a missing environment succeeds.
#[instrument(skip_all, fields(environment.id = id))]
pub fn delete<B: VcsBackend + ?Sized>(vcs: &B, binding: &RepoBinding, id: &str) -> Result<()> {
    let path = binding.worktree_path(id);
    if path.exists() {
        info!(path = %path.display(), "removing worktree");
        if let Err(err) = fs::remove_dir_all(&path) {
            warn!(path = %path.display(), err = %err, "failed to remove worktree");
        }
        remove_empty_parent(&path, &binding.worktrees_root);
    } else {
        debug!(path = %path.display(), "worktree already removed");
    }

    let mirror = &binding.mirror_path;
    if mirror.exists() {
        if let Err(err) = vcs.prune_worktrees(mirror) {
            warn!(err = %format!("{err:#}"), "failed to prune worktrees");
        }
        match vcs.ref_exists(mirror, &format!("refs/heads/{id}")) {
            Ok(true) => {
                if let Err(err) = vcs.delete_branch(mirror, id) {
                    warn!(err = %format!("{err:#}"), "failed to delete environment branch");
                }
            }
            Ok(false) => debug!("environment branch already deleted"),
            Err(err) => warn!(err = %format!("{err:#}"), "failed to look up environment branch"),
        }
    } else {
        debug!(mirror = %mirror.display(), "mirror missing, skipping branch cleanup");
    }

    if let Err(err) = vcs.prune_remote(&binding.source_path, MIRROR_REMOTE) {
        warn!(err = %format!("{err:#}"), "failed to prune container-use remote");
    }
    Ok(())
}

fn remove_empty_parent(path: &Path, root: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    if parent == root || !parent.starts_with(root) {
        return;
    }
    let is_empty = fs::read_dir(parent)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        if let Err(err) = fs::remove_dir(parent) {
            debug!(path = %parent.display(), err = %err, "leaving parent directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_empty_parent_stops_at_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("worktrees");
        let env_dir = root.join("web").join("quick-fox");
        fs::create_dir_all(&env_dir).expect("mkdir");
        fs::remove_dir(&env_dir).expect("rmdir");

        remove_empty_parent(&env_dir, &root);
        assert!(!root.join("web").exists());
        assert!(root.exists());
    }

    #[test]
    fn remove_empty_parent_keeps_siblings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("worktrees");
        fs::create_dir_all(root.join("web/other-env")).expect("mkdir");
        let env_dir = root.join("web/quick-fox");

        remove_empty_parent(&env_dir, &root);
        assert!(root.join("web/other-env").exists());
    }
}
