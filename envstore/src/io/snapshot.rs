//! The reserved `.container-use/` directory inside every worktree.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::types::EnvironmentConfig;

pub const RESERVED_DIR: &str = ".container-use";
const CONFIG_FILE: &str = "environment.json";
const INSTRUCTIONS_FILE: &str = "AGENT.md";

/// Remove everything in `worktree` except its `.git` link.
pub fn wipe_worktree(worktree: &Path) -> Result<()> {
    let entries =
        fs::read_dir(worktree).with_context(|| format!("read dir {}", worktree.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir {}", worktree.display()))?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(())
}

/// Write `environment.json` (config without instructions) and `AGENT.md`.
pub fn write_snapshot(worktree: &Path, config: &EnvironmentConfig) -> Result<()> {
    let dir = worktree.join(RESERVED_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    let mut raw = serde_json::to_string_pretty(config).context("serialize environment config")?;
    raw.push('\n');
    fs::write(dir.join(CONFIG_FILE), raw)
        .with_context(|| format!("write {}", dir.join(CONFIG_FILE).display()))?;
    fs::write(dir.join(INSTRUCTIONS_FILE), &config.instructions)
        .with_context(|| format!("write {}", dir.join(INSTRUCTIONS_FILE).display()))?;
    Ok(())
}

/// Config stored in `worktree`, or the default config if none was written yet.
pub fn load_snapshot(worktree: &Path) -> Result<EnvironmentConfig> {
    let dir = worktree.join(RESERVED_DIR);
    let mut config = match fs::read_to_string(dir.join(CONFIG_FILE)) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", dir.join(CONFIG_FILE).display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => EnvironmentConfig::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", dir.join(CONFIG_FILE).display()));
        }
    };
    match fs::read_to_string(dir.join(INSTRUCTIONS_FILE)) {
        Ok(instructions) => config.instructions = instructions,
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("read {}", dir.join(INSTRUCTIONS_FILE).display()));
        }
    }
    Ok(config)
}
