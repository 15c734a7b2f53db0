//! Shared environment value types.
//!
//! These carry no I/O. `EnvironmentConfig` is what gets snapshotted into the
//! reserved `.container-use/` directory of every worktree.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:24.04";
pub const DEFAULT_WORKDIR: &str = "/workdir";

/// Remote in the source repository that points at the mirror.
pub const MIRROR_REMOTE: &str = "container-use";
/// Notes ref carrying each environment's serialized `History`.
pub const STATE_NOTES_REF: &str = "container-use-state";
/// Notes ref carrying the free-text environment log.
pub const LOG_NOTES_REF: &str = "container-use";

/// How the container for an environment is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub base_image: String,
    pub setup_commands: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// `NAME=scheme://reference` pairs. Only references are stored, never values.
    pub secrets: Vec<String>,
    pub workdir: String,
    /// Stored separately as `AGENT.md`.
    #[serde(skip)]
    pub instructions: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            setup_commands: Vec::new(),
            env: Vec::new(),
            secrets: Vec::new(),
            workdir: DEFAULT_WORKDIR.to_string(),
            instructions: String::new(),
        }
    }
}

/// Address of an exposed port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub port: u16,
    /// Reachable from other environments.
    pub internal: String,
    /// Reachable from the host.
    pub external: String,
}

/// Auxiliary container requested by an agent (database, cache, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
}

/// A running service and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub config: ServiceConfig,
    pub endpoints: Vec<Endpoint>,
}

/// A source repository bound to its private mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoBinding {
    /// Absolute path of the user's repository (its top level).
    pub source_path: PathBuf,
    /// Absolute path of the bare mirror.
    pub mirror_path: PathBuf,
    pub worktrees_root: PathBuf,
}

impl RepoBinding {
    /// Worktree directory of environment `id` (`<worktrees_root>/<name>/<suffix>`).
    pub fn worktree_path(&self, id: &str) -> PathBuf {
        self.worktrees_root.join(id)
    }

    /// Local branch in the mirror, remote-tracking ref in the source.
    pub fn tracking_ref(&self, id: &str) -> String {
        format!("{MIRROR_REMOTE}/{id}")
    }
}
