//! Private bare mirror of a source repository.
//!
//! The mirror is the store's source of truth: environment branches, worktrees
//! and note refs live there. The source repository only sees it through the
//! `container-use` remote.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, info, instrument, warn};

use crate::core::git_url::normalize_git_url;
use crate::core::types::MIRROR_REMOTE;
use crate::error::StoreError;
use crate::io::vcs::VcsBackend;

/// Mirror location for `source`.
///
/// An existing `container-use` remote pointing at a directory wins, so a
/// binding made once is kept even if `origin` changes later. Otherwise the key
/// is the normalized `origin` URL, falling back to the absolute source path.
pub fn mirror_path_for<B: VcsBackend + ?Sized>(
    vcs: &B,
    mirrors_root: &Path,
    source: &Path,
) -> Result<PathBuf> {
    if let Some(url) = vcs.remote_url(source, MIRROR_REMOTE)? {
        let existing = PathBuf::from(url.strip_prefix("file://").unwrap_or(&url));
        if existing.is_absolute() && existing.is_dir() {
            debug!(mirror = %existing.display(), "using existing mirror binding");
            return Ok(existing);
        }
        warn!(url, "container-use remote does not point at a mirror, recomputing");
    }

    let key = match vcs.remote_url(source, "origin")? {
        Some(origin) => normalize_git_url(&origin)
            .with_context(|| format!("normalize origin of {}", source.display()))?,
        None => source.to_string_lossy().to_string(),
    };
    Ok(mirrors_root.join(key.trim_start_matches('/')))
}

/// Create the mirror for `source` if needed and (re)wire the remote to it.
#[instrument(skip_all, fields(source = %source.display()))]
pub fn ensure_mirror<B: VcsBackend + ?Sized>(
    vcs: &B,
    mirrors_root: &Path,
    source: &Path,
) -> Result<PathBuf> {
    let mirror = mirror_path_for(vcs, mirrors_root, source)?;
    let setup_error = |reason: String| StoreError::MirrorSetup {
        source_repo: source.to_path_buf(),
        mirror: mirror.clone(),
        reason,
    };

    if !mirror.exists() {
        info!(mirror = %mirror.display(), "creating mirror");
        clone_into_place(vcs, source, &mirror).map_err(|err| setup_error(format!("{err:#}")))?;
    }

    let mirror_str = mirror.to_string_lossy().to_string();
    match vcs
        .remote_url(source, MIRROR_REMOTE)
        .map_err(|err| setup_error(format!("{err:#}")))?
    {
        None => {
            debug!("adding container-use remote");
            vcs.add_remote(source, MIRROR_REMOTE, &mirror_str)
                .map_err(|err| setup_error(format!("{err:#}")))?;
        }
        Some(url) if url != mirror_str => {
            debug!(old = %url, "repairing container-use remote");
            vcs.set_remote_url(source, MIRROR_REMOTE, &mirror_str)
                .map_err(|err| setup_error(format!("{err:#}")))?;
        }
        Some(_) => {}
    }
    Ok(mirror)
}

/// Clone into a temporary sibling and rename, so a directory at `mirror` is
/// always a complete clone.
fn clone_into_place<B: VcsBackend + ?Sized>(vcs: &B, source: &Path, mirror: &Path) -> Result<()> {
    let parent = mirror
        .parent()
        .with_context(|| format!("mirror path has no parent: {}", mirror.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;

    let name = mirror
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "mirror".to_string());
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let staging = parent.join(format!(".{name}.tmp-{suffix}"));

    let result = vcs.clone_bare(source, &staging).and_then(|()| {
        match fs::rename(&staging, mirror) {
            Ok(()) => Ok(()),
            // Another store call finished its clone first.
            Err(_) if mirror.exists() => {
                debug!("mirror appeared concurrently, discarding our clone");
                Ok(())
            }
            Err(err) => {
                Err(err).with_context(|| format!("move {} into place", staging.display()))
            }
        }
    });
    if staging.exists() {
        if let Err(err) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), err = %err, "failed to remove partial clone");
        }
    }
    result
}
