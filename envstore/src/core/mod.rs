//! Deterministic, pure logic shared by the store.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod classifier;
pub mod env_id;
pub mod git_url;
pub mod history;
pub mod types;
