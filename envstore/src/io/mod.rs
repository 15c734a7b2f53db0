//! Side-effecting operations: git subprocesses, filesystem, containers.
//!
//! Everything with a seam worth faking in tests sits behind a trait
//! ([`vcs::VcsBackend`], [`engine::ContainerEngine`]).

pub mod commit;
pub mod config;
pub mod engine;
pub mod git;
pub mod mirror;
pub mod notes;
pub mod patch;
pub mod process;
pub mod snapshot;
pub mod vcs;
pub mod worktree;
