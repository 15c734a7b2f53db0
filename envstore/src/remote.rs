//! Storage capability for environments.
//!
//! [`Remote`] is what the lifecycle needs from a store; [`LocalRemote`] keeps
//! everything in a bare mirror on the local filesystem.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::{LOG_NOTES_REF, MIRROR_REMOTE, RepoBinding, STATE_NOTES_REF};
use crate::environment::Environment;
use crate::io::commit::commit_all;
use crate::io::engine::ContainerEngine;
use crate::io::notes::{append_log, load_state, propagate, save_state};
use crate::io::patch::apply_patch_bytes;
use crate::io::snapshot::{load_snapshot, wipe_worktree, write_snapshot};
use crate::io::vcs::VcsBackend;
use crate::io::worktree;

pub trait Remote {
    /// Prepare branch and worktree for `id`; returns the worktree.
    fn create(&self, id: &str) -> Result<PathBuf>;

    /// True if `id` has a branch or a worktree.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Export the container into the worktree, commit, record history and
    /// publish it all to the source repository. Returns whether a commit was made.
    fn save<E: ContainerEngine + ?Sized>(
        &self,
        env: &Environment,
        engine: &E,
        title: &str,
        explanation: &str,
    ) -> Result<bool>;

    /// Append to the environment's log note.
    fn note(&self, id: &str, note: &str) -> Result<()>;

    /// Apply a patch to the worktree and commit it.
    fn patch(&self, id: &str, patch: &[u8]) -> Result<bool>;

    fn load(&self, id: &str) -> Result<Environment>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Directory the container is built from.
    fn base_dir(&self, id: &str) -> PathBuf;

    fn list(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct LocalRemote<B> {
    vcs: B,
    binding: RepoBinding,
}

impl<B: VcsBackend> LocalRemote<B> {
    pub fn new(vcs: B, binding: RepoBinding) -> Self {
        Self { vcs, binding }
    }

    pub fn vcs(&self) -> &B {
        &self.vcs
    }

    pub fn binding(&self) -> &RepoBinding {
        &self.binding
    }

    pub fn into_parts(self) -> (B, RepoBinding) {
        (self.vcs, self.binding)
    }
}

impl<B: VcsBackend> LocalRemote<B> {
    /// Fetch the environment branch into the source, then both note refs.
    fn publish(&self, id: &str) -> Result<()> {
        self.vcs
            .fetch(&self.binding.source_path, MIRROR_REMOTE, &[id])
            .with_context(|| format!("fetch {id} into source"))?
            .require_updated(id)?;
        propagate(&self.vcs, &self.binding, STATE_NOTES_REF)?;
        propagate(&self.vcs, &self.binding, LOG_NOTES_REF)
    }
}

impl<B: VcsBackend> Remote for LocalRemote<B> {
    fn create(&self, id: &str) -> Result<PathBuf> {
        worktree::materialize(&self.vcs, &self.binding, id)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        worktree::exists(&self.vcs, &self.binding, id)
    }

    #[instrument(skip_all, fields(environment.id = %env.id, title))]
    fn save<E: ContainerEngine + ?Sized>(
        &self,
        env: &Environment,
        engine: &E,
        title: &str,
        explanation: &str,
    ) -> Result<bool> {
        let worktree = &env.worktree;

        wipe_worktree(worktree)?;
        engine
            .export(&env.id, env.config(), worktree)
            .with_context(|| format!("export {} into {}", env.id, worktree.display()))?;
        write_snapshot(worktree, env.config())?;

        let committed = commit_all(&self.vcs, worktree, title, explanation)?;
        save_state(&self.vcs, worktree, &env.history)?;
        self.publish(&env.id)?;

        info!(committed, revisions = env.history.len(), "environment saved");
        Ok(committed)
    }

    fn note(&self, id: &str, note: &str) -> Result<()> {
        let worktree = worktree::materialize(&self.vcs, &self.binding, id)?;
        append_log(&self.vcs, &worktree, note)?;
        propagate(&self.vcs, &self.binding, LOG_NOTES_REF)
    }

    fn patch(&self, id: &str, patch: &[u8]) -> Result<bool> {
        if patch.iter().all(u8::is_ascii_whitespace) {
            debug!("empty patch, nothing to apply");
            return Ok(false);
        }
        let worktree = worktree::materialize(&self.vcs, &self.binding, id)?;
        let history = load_state(&self.vcs, &worktree)?;
        apply_patch_bytes(&self.vcs, &worktree, patch)?;
        let committed = commit_all(
            &self.vcs,
            &worktree,
            "Apply patch",
            "Applied patch with uncommitted changes",
        )?;
        if committed {
            // The new tip carries the history forward.
            save_state(&self.vcs, &worktree, &history)?;
            self.publish(id)?;
        }
        Ok(committed)
    }

    fn load(&self, id: &str) -> Result<Environment> {
        let worktree = worktree::materialize(&self.vcs, &self.binding, id)?;
        let config = load_snapshot(&worktree)?;
        let history = load_state(&self.vcs, &worktree)?;
        Ok(Environment::new(id, worktree, config, history))
    }

    fn delete(&self, id: &str) -> Result<()> {
        worktree::delete(&self.vcs, &self.binding, id)
    }

    fn base_dir(&self, id: &str) -> PathBuf {
        self.binding.worktree_path(id)
    }

    /// Environment ids: mirror branches named `<name>/<suffix>` whose tip
    /// carries a state note.
    fn list(&self) -> Result<Vec<String>> {
        let mirror = &self.binding.mirror_path;
        let annotated: HashSet<String> = self
            .vcs
            .notes_list(mirror, STATE_NOTES_REF)?
            .into_iter()
            .collect();
        let mut ids: Vec<String> = self
            .vcs
            .list_branches(mirror)?
            .into_iter()
            .filter(|tip| tip.name.contains('/') && annotated.contains(&tip.commit))
            .map(|tip| tip.name)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
