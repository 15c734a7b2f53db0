//! Diagnostics for the store and its CLI.
//!
//! Everything durable lives in git (commits and notes); tracing output is for
//! debugging only and is never persisted.
//!
//! - `info`: lifecycle steps (mirror created, worktree added, environment
//!   saved), with an `environment.id` field on every span that concerns one
//!   environment.
//! - `debug`: every git invocation with its directory and arguments, plus
//!   each path the commit classifier skips.
//! - `warn`: recovered problems: diverged notes replaced, cleanup steps of
//!   `delete` that failed, git calls killed at their timeout, paths git
//!   reported that are not valid UTF-8.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=envstore=debug envstore list
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
