//! Stable exit codes for `envstore` commands.

use crate::error::StoreError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Any failure without a more specific code.
pub const FAILURE: i32 = 1;
/// The requested environment does not exist.
pub const NOT_FOUND: i32 = 2;
/// A git step (merge, apply, checkout) failed, usually on conflicts or a dirty tree.
pub const GIT_FAILED: i32 = 3;
/// The operation ran out of time.
pub const TIMED_OUT: i32 = 4;

/// Exit code for an error returned by a command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::EnvironmentNotFound(_)) => NOT_FOUND,
        Some(StoreError::GitCommand { .. }) => GIT_FAILED,
        Some(StoreError::DeadlineExceeded { .. }) => TIMED_OUT,
        _ => FAILURE,
    }
}
