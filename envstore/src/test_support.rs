//! Test-only helpers: throwaway repositories and a host-directory engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::core::types::{Endpoint, EnvironmentConfig, Service, ServiceConfig};
use crate::io::config::StoreConfig;
use crate::io::engine::{ContainerEngine, RunRequest};
use crate::io::process::run_command_with_timeout;

const IDENTITY: [(&str, &str); 4] = [
    ("user.name", "Env Store Tests"),
    ("user.email", "tests@envstore.invalid"),
    ("commit.gpgsign", "false"),
    ("init.defaultBranch", "main"),
];

/// Store config rooted at `root` with a hermetic commit identity.
pub fn test_config(root: &Path) -> StoreConfig {
    let mut cfg = StoreConfig::rooted_at(root);
    cfg.git_timeout_secs = 60;
    cfg.git.config = IDENTITY
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    cfg
}

/// Source repository on branch `main` with one commit, plus a scratch
/// directory for the store.
pub struct TestRepo {
    source: TempDir,
    store: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let source = tempfile::tempdir().context("create source tempdir")?;
        let store = tempfile::tempdir().context("create store tempdir")?;
        let repo = Self { source, store };
        repo.git(&["init", "-b", "main"])?;
        repo.write("README.md", "# demo\n")?;
        repo.commit_all("initial commit")?;
        Ok(repo)
    }

    /// Canonical path of the source repository.
    pub fn path(&self) -> PathBuf {
        fs::canonicalize(self.source.path()).unwrap_or_else(|_| self.source.path().to_path_buf())
    }

    pub fn store_root(&self) -> PathBuf {
        fs::canonicalize(self.store.path()).unwrap_or_else(|_| self.store.path().to_path_buf())
    }

    /// [`test_config`] rooted in this repo's store directory.
    pub fn config(&self) -> StoreConfig {
        test_config(&self.store_root())
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.source.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    /// Run git in the source repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(self.source.path(), args)
    }
}

/// Run git in `dir` with the test identity and return trimmed stdout.
pub fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    for (key, value) in IDENTITY {
        cmd.arg("-c").arg(format!("{key}={value}"));
    }
    let out = cmd
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Engine whose "containers" are plain host directories under `root/<id>`.
///
/// `start` copies the base directory (minus `.git`); `run` executes `sh -c`
/// inside the container directory.
pub struct FakeEngine {
    root: TempDir,
    starts: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Result<Self> {
        Ok(Self {
            root: tempfile::tempdir().context("create engine tempdir")?,
            starts: Mutex::new(Vec::new()),
        })
    }

    /// Filesystem of the container for `id`.
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.root.path().join(id)
    }

    /// Ids passed to `start`, in call order.
    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Write a file inside the container, as an agent command would.
    pub fn write(&self, id: &str, rel: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = self.container_dir(id).join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }
}

impl ContainerEngine for FakeEngine {
    fn start(&self, id: &str, _config: &EnvironmentConfig, base_dir: &Path) -> Result<()> {
        let dir = self.container_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("reset {}", dir.display()))?;
        }
        copy_tree(base_dir, &dir)?;
        self.starts
            .lock()
            .map_err(|_| anyhow!("starts lock poisoned"))?
            .push(id.to_string());
        Ok(())
    }

    fn export(&self, id: &str, _config: &EnvironmentConfig, dest: &Path) -> Result<()> {
        copy_tree(&self.container_dir(id), dest)
    }

    fn run(&self, id: &str, _config: &EnvironmentConfig, request: &RunRequest) -> Result<String> {
        let mut cmd = Command::new(&request.shell);
        cmd.args(["-c", &request.command])
            .current_dir(self.container_dir(id));
        let out = run_command_with_timeout(cmd, None, Duration::from_secs(30), 1024 * 1024)?;
        if !out.status.success() {
            bail!("command failed: {}", out.combined_lossy());
        }
        Ok(out.stdout_lossy())
    }

    fn run_background(
        &self,
        id: &str,
        _config: &EnvironmentConfig,
        _request: &RunRequest,
        ports: &[u16],
    ) -> Result<Vec<Endpoint>> {
        Ok(ports
            .iter()
            .map(|port| fake_endpoint(id, *port))
            .collect())
    }

    fn start_service(&self, id: &str, service: &ServiceConfig) -> Result<Service> {
        Ok(Service {
            config: service.clone(),
            endpoints: service
                .exposed_ports
                .iter()
                .map(|port| fake_endpoint(&format!("{id}-{}", service.name), *port))
                .collect(),
        })
    }
}

fn fake_endpoint(host: &str, port: u16) -> Endpoint {
    Endpoint {
        port,
        internal: format!("{}:{port}", host.replace('/', "-")),
        external: format!("127.0.0.1:{}", 40000 + port),
    }
}

/// Copy `from` into `to` recursively, skipping any `.git` entry.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("create {}", to.display()))?;
    let walker = WalkDir::new(from)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", from.display()))?;
        let rel = entry.path().strip_prefix(from)?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
