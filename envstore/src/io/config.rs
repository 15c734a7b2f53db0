//! Store configuration stored under `~/.config/container-use/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".config/container-use";

/// Store configuration (TOML).
///
/// Every component receives this explicitly; nothing reads global paths.
/// Missing fields default to the standard `~/.config/container-use` layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root under which one bare mirror per source repository is created.
    pub mirrors_root: PathBuf,

    /// Root under which one worktree per environment id is created.
    pub worktrees_root: PathBuf,

    /// Upper bound for a single git invocation, in seconds.
    pub git_timeout_secs: u64,

    /// Maximum captured stdout/stderr per git invocation.
    pub output_limit_bytes: usize,

    pub git: GitConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Extra `-c key=value` settings applied to every git call.
    pub config: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base = config_base_dir();
        Self {
            mirrors_root: base.join("repos"),
            worktrees_root: base.join("worktrees"),
            git_timeout_secs: 5 * 60,
            output_limit_bytes: 64 * 1024 * 1024,
            git: GitConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Config rooted at `base` (`<base>/repos`, `<base>/worktrees`).
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            mirrors_root: base.join("repos"),
            worktrees_root: base.join("worktrees"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.git_timeout_secs == 0 {
            return Err(anyhow!("git_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !self.mirrors_root.is_absolute() {
            return Err(anyhow!(
                "mirrors_root must be absolute (got {})",
                self.mirrors_root.display()
            ));
        }
        if !self.worktrees_root.is_absolute() {
            return Err(anyhow!(
                "worktrees_root must be absolute (got {})",
                self.worktrees_root.display()
            ));
        }
        if self.git.config.keys().any(|key| key.trim().is_empty()) {
            return Err(anyhow!("git.config keys must be non-empty"));
        }
        Ok(())
    }
}

/// `~/.config/container-use`, falling back to the working directory when no
/// home directory can be resolved.
pub fn config_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    config_base_dir().join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StoreConfig::default()`.
pub fn load_config(path: &Path) -> Result<StoreConfig> {
    if !path.exists() {
        let cfg = StoreConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StoreConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StoreConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = StoreConfig::rooted_at(temp.path());
        cfg.git
            .config
            .insert("user.name".to_string(), "Env Store".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "git_timeout_secs = 10\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.git_timeout_secs, 10);
        assert_eq!(cfg.output_limit_bytes, StoreConfig::default().output_limit_bytes);
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = StoreConfig {
            git_timeout_secs: 0,
            ..StoreConfig::rooted_at(temp.path())
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("git_timeout_secs"));
    }

    #[test]
    fn rejects_relative_roots() {
        let cfg = StoreConfig {
            mirrors_root: PathBuf::from("relative/repos"),
            ..StoreConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
