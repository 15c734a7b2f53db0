//! Entry point: a source repository bound to its mirror.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::budget::Deadline;
use crate::core::history::History;
use crate::core::types::RepoBinding;
use crate::environment::Environment;
use crate::error::StoreError;
use crate::io::config::StoreConfig;
use crate::io::engine::ContainerEngine;
use crate::io::git::GitCli;
use crate::io::mirror::ensure_mirror;
use crate::io::notes::load_state_at;
use crate::io::vcs::VcsBackend;
use crate::lifecycle;
use crate::remote::{LocalRemote, Remote};
use crate::review;

/// Environment store for one source repository.
///
/// Calls for different environment ids may run concurrently; calls for the
/// same id must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct Repository<B = GitCli> {
    remote: LocalRemote<B>,
}

impl Repository<GitCli> {
    /// Open the repository containing `path`, creating its mirror if needed.
    pub fn open(config: &StoreConfig, path: &Path) -> Result<Self> {
        Self::open_with(GitCli::new(config), config, path)
    }

    /// Bound every git call made through this handle by `deadline`.
    pub fn with_deadline(self, deadline: Deadline) -> Self {
        let (vcs, binding) = self.remote.into_parts();
        Self {
            remote: LocalRemote::new(vcs.with_deadline(deadline), binding),
        }
    }
}

impl<B: VcsBackend> Repository<B> {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open_with(vcs: B, config: &StoreConfig, path: &Path) -> Result<Self> {
        config.validate()?;
        let abs = fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))?;
        let source = vcs
            .toplevel(&abs)
            .with_context(|| format!("{} is not a git repository", abs.display()))?;
        let mirror = ensure_mirror(&vcs, &config.mirrors_root, &source)?;
        info!(source = %source.display(), mirror = %mirror.display(), "repository opened");
        Ok(Self {
            remote: LocalRemote::new(
                vcs,
                RepoBinding {
                    source_path: source,
                    mirror_path: mirror,
                    worktrees_root: config.worktrees_root.clone(),
                },
            ),
        })
    }

    pub fn binding(&self) -> &RepoBinding {
        self.remote.binding()
    }

    pub fn create<E: ContainerEngine + ?Sized>(
        &self,
        engine: &E,
        name: &str,
        explanation: &str,
    ) -> Result<Environment> {
        self.create_with_rng(engine, name, explanation, &mut rand::thread_rng())
    }

    /// [`Repository::create`] with an explicit source of randomness for the id.
    pub fn create_with_rng<E, G>(
        &self,
        engine: &E,
        name: &str,
        explanation: &str,
        rng: &mut G,
    ) -> Result<Environment>
    where
        E: ContainerEngine + ?Sized,
        G: rand::Rng + ?Sized,
    {
        lifecycle::create(&self.remote, engine, name, explanation, rng)
    }

    pub fn get(&self, id: &str) -> Result<Environment> {
        lifecycle::get(&self.remote, id)
    }

    pub fn update<E, F>(
        &self,
        engine: &E,
        id: &str,
        title: &str,
        explanation: &str,
        mutation: F,
    ) -> Result<Environment>
    where
        E: ContainerEngine + ?Sized,
        F: FnOnce(&mut Environment, &E) -> Result<()>,
    {
        lifecycle::update(&self.remote, engine, id, title, explanation, mutation)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.remote.list()
    }

    pub fn append_log(&self, id: &str, note: &str) -> Result<()> {
        self.ensure_exists(id)?;
        self.remote.note(id, note)
    }

    /// Apply `patch` inside environment `id` and commit it.
    pub fn apply_patch(&self, id: &str, patch: &[u8]) -> Result<bool> {
        self.ensure_exists(id)?;
        self.remote.patch(id, patch)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.remote.delete(id)
    }

    /// History recorded on any commit of the source repository.
    pub fn history_at(&self, commit: &str) -> Result<History> {
        load_state_at(self.remote.vcs(), &self.binding().source_path, commit)
    }

    pub fn log(&self, id: &str, patch: bool) -> Result<String> {
        review::log(self.remote.vcs(), self.binding(), id, patch)
    }

    pub fn diff(&self, id: &str) -> Result<String> {
        review::diff(self.remote.vcs(), self.binding(), id)
    }

    pub fn checkout(&self, id: &str) -> Result<String> {
        review::checkout(self.remote.vcs(), self.binding(), id)
    }

    pub fn merge(&self, id: &str) -> Result<()> {
        review::merge(self.remote.vcs(), self.binding(), id)
    }

    pub fn apply(&self, id: &str) -> Result<()> {
        review::apply(self.remote.vcs(), self.binding(), id)
    }

    fn ensure_exists(&self, id: &str) -> Result<()> {
        if self.remote.exists(id)? {
            return Ok(());
        }
        Err(StoreError::EnvironmentNotFound(id.to_string()).into())
    }
}
