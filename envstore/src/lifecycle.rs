//! Create / get / update orchestration on top of a [`Remote`].

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, info, instrument};

use crate::core::env_id::{generate_id, validate_name};
use crate::core::history::History;
use crate::core::types::EnvironmentConfig;
use crate::environment::Environment;
use crate::error::StoreError;
use crate::io::engine::ContainerEngine;
use crate::remote::Remote;

/// Ids drawn before giving up on finding an unused one.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Create environment `name`: new branch + worktree seeded from the source's
/// current branch and uncommitted changes, container started, first save.
#[instrument(skip_all, fields(name))]
pub fn create<R, E, G>(
    remote: &R,
    engine: &E,
    name: &str,
    explanation: &str,
    rng: &mut G,
) -> Result<Environment>
where
    R: Remote,
    E: ContainerEngine + ?Sized,
    G: Rng + ?Sized,
{
    validate_name(name)?;
    let id = unique_id(remote, name, rng)?;
    info!(environment.id = %id, "creating environment");

    let worktree = remote.create(&id)?;
    let env = Environment::new(&id, worktree, EnvironmentConfig::default(), History::new());
    engine
        .start(&id, env.config(), &remote.base_dir(&id))
        .with_context(|| format!("start container for {id}"))?;
    remote.save(&env, engine, &format!("Create env {name}"), explanation)?;
    Ok(env)
}

/// Load an existing environment.
pub fn get<R: Remote>(remote: &R, id: &str) -> Result<Environment> {
    if !remote.exists(id)? {
        return Err(StoreError::EnvironmentNotFound(id.to_string()).into());
    }
    remote.load(id)
}

/// Rehydrate the container, apply `mutation`, then save.
#[instrument(skip_all, fields(environment.id = id, title))]
pub fn update<R, E, F>(
    remote: &R,
    engine: &E,
    id: &str,
    title: &str,
    explanation: &str,
    mutation: F,
) -> Result<Environment>
where
    R: Remote,
    E: ContainerEngine + ?Sized,
    F: FnOnce(&mut Environment, &E) -> Result<()>,
{
    let mut env = get(remote, id)?;
    engine
        .start(id, env.config(), &remote.base_dir(id))
        .with_context(|| format!("rehydrate container for {id}"))?;
    mutation(&mut env, engine)?;
    remote.save(&env, engine, title, explanation)?;
    Ok(env)
}

fn unique_id<R: Remote, G: Rng + ?Sized>(remote: &R, name: &str, rng: &mut G) -> Result<String> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = generate_id(name, rng);
        if !remote.exists(&id)? {
            return Ok(id);
        }
        debug!(id, "id already taken, drawing another");
    }
    Err(StoreError::IdExhausted(name.to_string()).into())
}
