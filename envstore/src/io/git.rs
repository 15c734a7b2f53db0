//! `git` subprocess implementation of [`VcsBackend`].
//!
//! Every call goes through [`run_command_with_timeout`], so a hung git process
//! (credential prompt, slow remote) is killed instead of blocking the store.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::budget::Deadline;
use crate::error::StoreError;
use crate::io::config::StoreConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};
use crate::io::vcs::{
    BranchTip, FetchOutcome, MergeMode, StatusEntry, VcsBackend, WorktreeStart,
};

/// Shared record of git invocations (`args` joined by spaces), for tests.
pub type GitJournal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
    output_limit_bytes: usize,
    config: Vec<(String, String)>,
    deadline: Deadline,
    journal: Option<GitJournal>,
}

impl GitCli {
    pub fn new(cfg: &StoreConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.git_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            config: cfg
                .git
                .config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            deadline: Deadline::none(),
            journal: None,
        }
    }

    /// Bound every subsequent call by `deadline`.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_journal(mut self, journal: GitJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn record(&self, args: &[&str]) {
        if let Some(journal) = &self.journal {
            match journal.lock() {
                Ok(mut entries) => entries.push(args.join(" ")),
                Err(_) => warn!("git journal lock poisoned"),
            }
        }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        for (key, value) in &self.config {
            cmd.arg("-c").arg(format!("{key}={value}"));
        }
        cmd.args(args)
            .current_dir(dir)
            // Messages are matched on ("no note found", "[rejected]").
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run_with_input(&self, dir: &Path, args: &[&str], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let operation = format!("git {}", args.join(" "));
        let timeout = self.deadline.clamp(self.timeout, &operation)?;
        debug!(dir = %dir.display(), args = %args.join(" "), "git");
        self.record(args);

        let out = run_command_with_timeout(
            self.command(dir, args),
            stdin,
            timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("spawn {operation}"))?;

        if out.timed_out {
            warn!(dir = %dir.display(), args = %args.join(" "), "git killed after timeout");
            return Err(StoreError::DeadlineExceeded { operation }.into());
        }
        if !out.status.success() {
            debug!(code = ?out.status.code(), "git exited unsuccessfully");
        }
        Ok(out)
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_input(dir, args, None)
    }

    fn run_checked_with_input(
        &self,
        dir: &Path,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<CommandOutput> {
        let out = self.run_with_input(dir, args, stdin)?;
        if !out.status.success() {
            return Err(git_failure(dir, args, &out).into());
        }
        Ok(out)
    }

    fn run_checked(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        self.run_checked_with_input(dir, args, None)
    }

    /// Stdout of a successful call whose output will be parsed.
    fn run_capture_bytes(&self, dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
        let out = self.run_checked(dir, args)?;
        if out.stdout_truncated > 0 {
            return Err(anyhow!(
                "git {} output exceeded {} bytes",
                args.join(" "),
                self.output_limit_bytes
            ));
        }
        Ok(out.stdout)
    }

    fn run_capture(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let stdout = self.run_capture_bytes(dir, args)?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }
}

fn git_failure(dir: &Path, args: &[&str], out: &CommandOutput) -> StoreError {
    StoreError::GitCommand {
        dir: dir.to_path_buf(),
        args: args.join(" "),
        code: out.status.code(),
        output: out.combined_lossy(),
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {}", path.display()))
}

impl VcsBackend for GitCli {
    #[instrument(skip_all, fields(source = %source.display(), dest = %dest.display()))]
    fn clone_bare(&self, source: &Path, dest: &Path) -> Result<()> {
        let parent: PathBuf = dest
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("clone destination has no parent: {}", dest.display()))?;
        self.run_checked(
            &parent,
            &["clone", "--bare", path_arg(source)?, path_arg(dest)?],
        )?;
        Ok(())
    }

    fn toplevel(&self, dir: &Path) -> Result<PathBuf> {
        let out = self.run_capture(dir, &["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>> {
        let args = ["remote", "get-url", remote];
        let out = self.run(repo, &args)?;
        if out.status.success() {
            return Ok(Some(out.stdout_lossy().trim().to_string()));
        }
        if out.combined_lossy().contains("No such remote") {
            return Ok(None);
        }
        Err(git_failure(repo, &args, &out).into())
    }

    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<()> {
        self.run_checked(repo, &["remote", "add", remote, url])?;
        Ok(())
    }

    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<()> {
        self.run_checked(repo, &["remote", "set-url", remote, url])?;
        Ok(())
    }

    fn prune_remote(&self, repo: &Path, remote: &str) -> Result<()> {
        self.run_checked(repo, &["remote", "prune", remote])?;
        Ok(())
    }

    fn fetch(&self, repo: &Path, remote: &str, refspecs: &[&str]) -> Result<FetchOutcome> {
        let mut args = vec!["fetch", remote];
        args.extend_from_slice(refspecs);
        let out = self.run(repo, &args)?;
        if out.status.success() {
            return Ok(FetchOutcome::Updated);
        }
        if out.combined_lossy().contains("[rejected]") {
            debug!(remote, refspecs = %refspecs.join(" "), "fetch rejected");
            return Ok(FetchOutcome::Rejected);
        }
        Err(git_failure(repo, &args, &out).into())
    }

    fn push_force(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run_checked(repo, &["push", remote, "--force", branch])?;
        Ok(())
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        let out = self.run_capture(repo, &["branch", "--show-current"])?;
        let name = out.trim();
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    fn ref_exists(&self, repo: &Path, refname: &str) -> Result<bool> {
        let out = self.run(repo, &["show-ref", "--verify", "--quiet", refname])?;
        Ok(out.status.success())
    }

    fn resolve_commit(&self, repo: &Path, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.run(repo, &["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(out.stdout_lossy().trim().to_string()))
    }

    fn delete_ref(&self, repo: &Path, refname: &str) -> Result<()> {
        self.run_checked(repo, &["update-ref", "-d", refname])?;
        Ok(())
    }

    fn list_branches(&self, repo: &Path) -> Result<Vec<BranchTip>> {
        let out = self.run_capture(
            repo,
            &[
                "for-each-ref",
                "--format=%(objectname) %(refname:short)",
                "refs/heads/",
            ],
        )?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let (commit, name) = line
                    .split_once(' ')
                    .ok_or_else(|| anyhow!("unexpected for-each-ref line: '{line}'"))?;
                Ok(BranchTip {
                    name: name.to_string(),
                    commit: commit.to_string(),
                })
            })
            .collect()
    }

    fn create_tracking_branch(&self, repo: &Path, branch: &str, upstream: &str) -> Result<()> {
        self.run_checked(repo, &["branch", "--track", branch, upstream])?;
        Ok(())
    }

    fn delete_branch(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run_checked(repo, &["branch", "-D", branch])?;
        Ok(())
    }

    fn add_worktree(&self, repo: &Path, path: &Path, start: WorktreeStart<'_>) -> Result<()> {
        let path = path_arg(path)?;
        match start {
            WorktreeStart::Existing(branch) => {
                self.run_checked(repo, &["worktree", "add", path, branch])?;
            }
            WorktreeStart::NewBranch {
                branch,
                start_point,
            } => {
                self.run_checked(repo, &["worktree", "add", "-b", branch, path, start_point])?;
            }
        }
        Ok(())
    }

    fn prune_worktrees(&self, repo: &Path) -> Result<()> {
        self.run_checked(repo, &["worktree", "prune"])?;
        Ok(())
    }

    fn status(&self, dir: &Path) -> Result<Vec<StatusEntry>> {
        let raw = self.run_capture_bytes(
            dir,
            &["status", "--porcelain=v1", "-z", "--untracked-files=normal"],
        )?;
        parse_status_z(&raw)
    }

    fn untracked_files(&self, dir: &Path) -> Result<Vec<String>> {
        let raw =
            self.run_capture_bytes(dir, &["ls-files", "--others", "--exclude-standard", "-z"])?;
        Ok(raw
            .split(|byte| *byte == 0)
            .filter(|path| !path.is_empty())
            .filter_map(utf8_path)
            .collect())
    }

    fn stage(&self, dir: &Path, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut pathspecs = paths.join("\0").into_bytes();
        pathspecs.push(0);
        self.run_checked_with_input(
            dir,
            &[
                "--literal-pathspecs",
                "add",
                "--all",
                "--pathspec-from-file=-",
                "--pathspec-file-nul",
            ],
            Some(&pathspecs),
        )?;
        Ok(())
    }

    fn has_staged_changes(&self, dir: &Path) -> Result<bool> {
        let args = ["diff", "--cached", "--quiet"];
        let out = self.run(dir, &args)?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(git_failure(dir, &args, &out).into()),
        }
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<()> {
        self.run_checked(dir, &["commit", "-m", message])?;
        Ok(())
    }

    fn diff_head_binary(&self, dir: &Path) -> Result<Vec<u8>> {
        self.run_capture_bytes(dir, &["diff", "--binary", "HEAD"])
    }

    fn apply_patch(&self, dir: &Path, patch: &[u8]) -> Result<()> {
        self.run_checked_with_input(dir, &["apply"], Some(patch))?;
        Ok(())
    }

    fn notes_add_force(
        &self,
        dir: &Path,
        notes_ref: &str,
        commit: &str,
        content: &str,
    ) -> Result<()> {
        self.run_checked_with_input(
            dir,
            &["notes", "--ref", notes_ref, "add", "-f", "-F", "-", commit],
            Some(content.as_bytes()),
        )?;
        Ok(())
    }

    fn notes_append(&self, dir: &Path, notes_ref: &str, commit: &str, message: &str) -> Result<()> {
        self.run_checked(
            dir,
            &["notes", "--ref", notes_ref, "append", "-m", message, commit],
        )?;
        Ok(())
    }

    fn notes_show(&self, dir: &Path, notes_ref: &str, commit: &str) -> Result<Option<String>> {
        let args = ["notes", "--ref", notes_ref, "show", commit];
        let out = self.run(dir, &args)?;
        if out.status.success() {
            if out.stdout_truncated > 0 {
                return Err(anyhow!("note on {commit} exceeded output limit"));
            }
            return Ok(Some(out.stdout_lossy()));
        }
        if out.combined_lossy().contains("no note found") {
            return Ok(None);
        }
        Err(git_failure(dir, &args, &out).into())
    }

    fn notes_list(&self, dir: &Path, notes_ref: &str) -> Result<Vec<String>> {
        let out = self.run_capture(dir, &["notes", "--ref", notes_ref, "list"])?;
        Ok(out
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .map(str::to_string)
            .collect())
    }

    fn log(&self, dir: &Path, revision: &str, patch: bool, notes_refs: &[&str]) -> Result<String> {
        let notes: Vec<String> = notes_refs
            .iter()
            .map(|r| format!("--notes=refs/notes/{r}"))
            .collect();
        let mut args = vec!["log"];
        if patch {
            args.push("--patch");
        }
        args.extend(notes.iter().map(String::as_str));
        args.push(revision);
        args.push("--");
        self.run_capture(dir, &args)
    }

    fn diff_range(&self, dir: &Path, range: &str) -> Result<String> {
        self.run_capture(dir, &["diff", range, "--"])
    }

    fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run_checked(dir, &["checkout", branch])?;
        Ok(())
    }

    fn merge(&self, dir: &Path, branch: &str, mode: MergeMode) -> Result<()> {
        match mode {
            MergeMode::PreserveHistory => {
                let message = format!("Merge environment {branch}");
                self.run_checked(
                    dir,
                    &["merge", "--no-ff", "--autostash", "-m", &message, "--", branch],
                )?;
            }
            MergeMode::Squash => {
                self.run_checked(dir, &["merge", "--squash", "--autostash", "--", branch])?;
            }
            MergeMode::FastForward => {
                self.run_checked(dir, &["merge", "--ff-only", "--", branch])?;
            }
        }
        Ok(())
    }
}

/// Parse `git status --porcelain=v1 -z`.
///
/// Renames and copies are followed by their original path as a separate
/// NUL-terminated field, which is dropped here. Paths that are not valid UTF-8
/// are logged and left out.
fn parse_status_z(raw: &[u8]) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    let mut fields = raw.split(|byte| *byte == 0).filter(|field| !field.is_empty());
    while let Some(field) = fields.next() {
        if field.len() < 4 || field[2] != b' ' {
            return Err(anyhow!(
                "unexpected porcelain entry: '{}'",
                String::from_utf8_lossy(field)
            ));
        }
        let code = String::from_utf8_lossy(&field[..2]).to_string();
        if code.starts_with(['R', 'C']) {
            fields.next();
        }
        if let Some(path) = utf8_path(&field[3..]) {
            entries.push(StatusEntry { code, path });
        }
    }
    Ok(entries)
}

fn utf8_path(raw: &[u8]) -> Option<String> {
    match std::str::from_utf8(raw) {
        Ok(path) => Some(path.to_string()),
        Err(_) => {
            warn!(path = %String::from_utf8_lossy(raw), "skipping path that is not valid UTF-8");
            None
        }
    }
}
