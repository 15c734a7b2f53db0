//! An environment: branch + worktree + config + history.
//!
//! Mutating operations drive the container engine and record a revision; the
//! result only becomes durable when the store propagates the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::env_id::name_from_id;
use crate::core::history::History;
use crate::core::types::{Endpoint, EnvironmentConfig, Service, ServiceConfig};
use crate::io::engine::{ContainerEngine, RunRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub worktree: PathBuf,
    config: EnvironmentConfig,
    pub history: History,
    /// Services started during this session. Not persisted.
    pub services: Vec<Service>,
}

impl Environment {
    pub fn new(id: &str, worktree: PathBuf, config: EnvironmentConfig, history: History) -> Self {
        Self {
            id: id.to_string(),
            name: name_from_id(id).to_string(),
            worktree,
            config,
            history,
            services: Vec::new(),
        }
    }

    /// Current configuration. Changed only through [`Environment::update_config`],
    /// which rebuilds the container.
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Run `request` to completion and record its output.
    #[instrument(skip_all, fields(environment.id = %self.id, command = %request.command))]
    pub fn run<E: ContainerEngine + ?Sized>(
        &mut self,
        engine: &E,
        request: &RunRequest,
        explanation: &str,
    ) -> Result<String> {
        let output = engine
            .run(&self.id, &self.config, request)
            .with_context(|| format!("run '{}' in {}", request.command, self.id))?;
        self.history.add(
            format!("Run {}", request.command),
            explanation,
            Some(output.clone()),
        );
        Ok(output)
    }

    /// Start `request` in the background, exposing `ports`.
    #[instrument(skip_all, fields(environment.id = %self.id, command = %request.command))]
    pub fn run_background<E: ContainerEngine + ?Sized>(
        &mut self,
        engine: &E,
        request: &RunRequest,
        ports: &[u16],
        explanation: &str,
    ) -> Result<Vec<Endpoint>> {
        let endpoints = engine
            .run_background(&self.id, &self.config, request, ports)
            .with_context(|| format!("run '{}' in background in {}", request.command, self.id))?;
        let summary = endpoints
            .iter()
            .map(|e| format!("{}: internal {} external {}", e.port, e.internal, e.external))
            .collect::<Vec<_>>()
            .join("\n");
        self.history.add(
            format!("Run {} in background", request.command),
            explanation,
            Some(summary),
        );
        Ok(endpoints)
    }

    /// Replace the configuration and rebuild the container from the worktree.
    #[instrument(skip_all, fields(environment.id = %self.id))]
    pub fn update_config<E: ContainerEngine + ?Sized>(
        &mut self,
        engine: &E,
        config: EnvironmentConfig,
        explanation: &str,
    ) -> Result<()> {
        engine
            .start(&self.id, &config, &self.worktree)
            .with_context(|| format!("restart {} with new config", self.id))?;
        info!(base_image = %config.base_image, "environment reconfigured");
        self.config = config;
        self.history
            .add("Update environment configuration", explanation, None);
        Ok(())
    }

    #[instrument(skip_all, fields(environment.id = %self.id, service = %config.name))]
    pub fn add_service<E: ContainerEngine + ?Sized>(
        &mut self,
        engine: &E,
        config: ServiceConfig,
        explanation: &str,
    ) -> Result<Service> {
        let service = engine
            .start_service(&self.id, &config)
            .with_context(|| format!("start service {}", config.name))?;
        self.history
            .add(format!("Add service {}", config.name), explanation, None);
        self.services.push(service.clone());
        Ok(service)
    }
}
