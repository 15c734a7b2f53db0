//! Container engine seam.
//!
//! The store never builds or runs containers itself; it hands the engine a
//! base directory (the worktree) and later asks for the container's workdir
//! back.

use std::path::Path;

use anyhow::Result;

use crate::core::types::{Endpoint, EnvironmentConfig, Service, ServiceConfig};

/// A command to execute inside an environment's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub command: String,
    pub shell: String,
    /// Run through the image entrypoint instead of the shell.
    pub use_entrypoint: bool,
}

impl RunRequest {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: "sh".to_string(),
            use_entrypoint: false,
        }
    }
}

pub trait ContainerEngine: Send + Sync {
    /// Build (or rebuild) the container for `id` from `config`, seeded with
    /// the contents of `base_dir`.
    fn start(&self, id: &str, config: &EnvironmentConfig, base_dir: &Path) -> Result<()>;

    /// Write the container's full workdir tree into `dest`.
    fn export(&self, id: &str, config: &EnvironmentConfig, dest: &Path) -> Result<()>;

    /// Run to completion and return stdout.
    fn run(&self, id: &str, config: &EnvironmentConfig, request: &RunRequest) -> Result<String>;

    /// Start a long-running command and expose `ports`.
    fn run_background(
        &self,
        id: &str,
        config: &EnvironmentConfig,
        request: &RunRequest,
        ports: &[u16],
    ) -> Result<Vec<Endpoint>>;

    fn start_service(&self, id: &str, service: &ServiceConfig) -> Result<Service>;
}
