//! Environment metadata stored as git notes.
//!
//! Two refs are used: the state ref holds the serialized `History` of the
//! commit it annotates, the log ref accumulates free-text entries.
//! Notes are written in the mirror (through a worktree) and copied into the
//! source repository with [`propagate`].

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::history::History;
use crate::core::types::{LOG_NOTES_REF, MIRROR_REMOTE, RepoBinding, STATE_NOTES_REF};
use crate::io::vcs::{FetchOutcome, VcsBackend};

/// Replace the state note on the worktree's HEAD with `history`.
pub fn save_state<B: VcsBackend + ?Sized>(vcs: &B, worktree: &Path, history: &History) -> Result<()> {
    let raw = history.to_json().context("serialize history")?;
    vcs.notes_add_force(worktree, STATE_NOTES_REF, "HEAD", &raw)
        .with_context(|| format!("save state note in {}", worktree.display()))
}

/// Append `note` to the log note on the worktree's HEAD.
pub fn append_log<B: VcsBackend + ?Sized>(vcs: &B, worktree: &Path, note: &str) -> Result<()> {
    vcs.notes_append(worktree, LOG_NOTES_REF, "HEAD", note)
        .with_context(|| format!("append log note in {}", worktree.display()))
}

pub fn load_state<B: VcsBackend + ?Sized>(vcs: &B, worktree: &Path) -> Result<History> {
    load_state_at(vcs, worktree, "HEAD")
}

/// History recorded on `commit`; empty when the commit carries no state note.
pub fn load_state_at<B: VcsBackend + ?Sized>(vcs: &B, dir: &Path, commit: &str) -> Result<History> {
    match vcs.notes_show(dir, STATE_NOTES_REF, commit)? {
        None => Ok(History::new()),
        Some(raw) => History::from_json(&raw)
            .with_context(|| format!("parse state note on {commit}")),
    }
}

/// Copy `refs/notes/<notes_ref>` from the mirror into the source repository.
///
/// The source copy is a read mirror: if it diverged, it is deleted and fetched
/// again, exactly once.
#[instrument(skip_all, fields(notes_ref))]
pub fn propagate<B: VcsBackend + ?Sized>(
    vcs: &B,
    binding: &RepoBinding,
    notes_ref: &str,
) -> Result<()> {
    let full = format!("refs/notes/{notes_ref}");
    if !vcs.ref_exists(&binding.mirror_path, &full)? {
        debug!("notes ref absent from mirror, nothing to propagate");
        return Ok(());
    }

    let refspec = format!("{full}:{full}");
    let source = &binding.source_path;
    match vcs.fetch(source, MIRROR_REMOTE, &[&refspec])? {
        FetchOutcome::Updated => Ok(()),
        FetchOutcome::Rejected => {
            warn!(notes_ref, "local notes diverged, replacing with mirror copy");
            vcs.delete_ref(source, &full)?;
            match vcs.fetch(source, MIRROR_REMOTE, &[&refspec])? {
                FetchOutcome::Updated => Ok(()),
                FetchOutcome::Rejected => Err(anyhow!(
                    "fetch of {full} rejected again after deleting the local ref"
                )),
            }
        }
    }
}
