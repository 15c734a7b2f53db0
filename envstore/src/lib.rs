//! Git-backed storage and sync for agent environments.
//!
//! Each environment is a branch plus a worktree in a private bare mirror of
//! the user's repository. Container state is exported into the worktree and
//! committed; history and logs ride along as git notes and are propagated back
//! into the user's repository after every save.
//!
//! - **[`core`]**: Pure logic (naming, classification, history, URL keys).
//! - **[`io`]**: Side effects (git subprocesses, filesystem, container seam).
//!
//! Orchestration modules ([`lifecycle`], [`remote`], [`review`],
//! [`repository`]) tie the two together; [`repository::Repository`] is the
//! entry point.

pub mod core;
pub mod environment;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod remote;
pub mod repository;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use environment::Environment;
pub use error::StoreError;
pub use repository::Repository;
