//! Selective staging and committing of a worktree.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::core::classifier::{MAX_TEXT_FILE_BYTES, SNIFF_BYTES, is_binary_prefix, should_skip_path};
use crate::io::vcs::{StatusEntry, VcsBackend};

/// Stage every committable change in `worktree` and commit it.
///
/// Returns `false` (and touches nothing) when the worktree is clean or when
/// every change was filtered out.
#[instrument(skip_all, fields(worktree = %worktree.display(), title))]
pub fn commit_all<B: VcsBackend + ?Sized>(
    vcs: &B,
    worktree: &Path,
    title: &str,
    description: &str,
) -> Result<bool> {
    let entries = vcs.status(worktree)?;
    if entries.is_empty() {
        debug!("worktree clean, nothing to commit");
        return Ok(false);
    }

    let paths = select_paths(vcs, worktree, &entries)?;
    debug!(candidates = entries.len(), staged = paths.len(), "classified changes");
    vcs.stage(worktree, &paths)?;

    if !vcs.has_staged_changes(worktree)? {
        debug!("all changes filtered, skipping commit");
        return Ok(false);
    }
    vcs.commit(worktree, &format!("{title}\n\n{description}"))
        .with_context(|| format!("commit in {}", worktree.display()))?;
    Ok(true)
}

fn select_paths<B: VcsBackend + ?Sized>(
    vcs: &B,
    worktree: &Path,
    entries: &[StatusEntry],
) -> Result<Vec<String>> {
    let mut selected = Vec::new();
    // Loaded on first untracked directory: ignore rules still apply inside it.
    let mut untracked: Option<HashSet<String>> = None;

    for entry in entries {
        if entry.is_deleted() {
            selected.push(entry.path.clone());
            continue;
        }
        if entry.is_staged_add() {
            continue;
        }
        if entry.is_untracked() && entry.path.ends_with('/') {
            if should_skip_path(&entry.path) {
                debug!(dir = %entry.path, "skipping untracked directory");
                continue;
            }
            if untracked.is_none() {
                untracked = Some(vcs.untracked_files(worktree)?.into_iter().collect());
            }
            collect_untracked_dir(worktree, &entry.path, untracked.as_ref(), &mut selected)?;
            continue;
        }
        if should_skip_path(&entry.path) || sniff_is_binary(&worktree.join(&entry.path)) {
            debug!(path = %entry.path, "skipping file");
            continue;
        }
        selected.push(entry.path.clone());
    }
    Ok(selected)
}

fn collect_untracked_dir(
    worktree: &Path,
    dir: &str,
    allowed: Option<&HashSet<String>>,
    selected: &mut Vec<String>,
) -> Result<()> {
    let walker = WalkDir::new(worktree.join(dir))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            match relative(worktree, entry.path()) {
                Some(rel) => !should_skip_path(&format!("{rel}/")),
                None => false,
            }
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("walk untracked directory {dir}"))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Some(rel) = relative(worktree, entry.path()) else {
            continue;
        };
        if allowed.is_some_and(|set| !set.contains(&rel)) {
            continue;
        }
        if should_skip_path(&rel) || sniff_is_binary(entry.path()) {
            debug!(path = %rel, "skipping file");
            continue;
        }
        selected.push(rel);
    }
    Ok(())
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

/// True if the file must be treated as binary.
///
/// Unreadable and oversized files count as binary.
pub fn sniff_is_binary(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return true;
    };
    if meta.len() > MAX_TEXT_FILE_BYTES {
        return true;
    }
    let Ok(file) = File::open(path) else {
        return true;
    };
    let mut prefix = Vec::with_capacity(SNIFF_BYTES);
    if file.take(SNIFF_BYTES as u64).read_to_end(&mut prefix).is_err() {
        return true;
    }
    is_binary_prefix(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_file_is_not_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("main.rs");
        fs::write(&path, "fn main() {}\n").expect("write");
        assert!(!sniff_is_binary(&path));
    }

    #[test]
    fn nul_in_prefix_is_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("blob.dat");
        let mut bytes = vec![b'a'; 100];
        bytes[50] = 0;
        fs::write(&path, bytes).expect("write");
        assert!(sniff_is_binary(&path));
    }

    #[test]
    fn nul_after_sniff_window_is_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("late.txt");
        let mut bytes = vec![b'a'; SNIFF_BYTES + 10];
        bytes[SNIFF_BYTES + 5] = 0;
        fs::write(&path, bytes).expect("write");
        assert!(!sniff_is_binary(&path));
    }

    #[test]
    fn missing_file_is_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(sniff_is_binary(&temp.path().join("nope")));
    }

    #[test]
    fn relative_uses_forward_slashes() {
        let root = Path::new("/w");
        assert_eq!(
            relative(root, Path::new("/w/src/a/b.rs")).as_deref(),
            Some("src/a/b.rs")
        );
    }
}
