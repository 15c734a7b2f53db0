//! Deterministic classification of changed paths for automatic commits.
//!
//! Agents routinely pull dependency trees and build artifacts into their
//! workdir. Only text-diffable sources are committed; everything matched here
//! stays on disk but out of history.

/// Bytes sampled from the start of a file when sniffing for binary content.
pub const SNIFF_BYTES: usize = 8000;

/// Files above this size are never staged.
pub const MAX_TEXT_FILE_BYTES: u64 = 10 * 1024 * 1024;

const SKIP_EXTENSIONS: &[&str] = &[
    ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz", ".zip", ".rar", ".7z",
    ".gz", ".bz2", ".xz", ".exe", ".bin", ".dmg", ".pkg", ".msi", ".jpg", ".jpeg", ".png",
    ".gif", ".bmp", ".tiff", ".svg", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".mkv",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".so", ".dylib", ".dll", ".a",
    ".lib",
];

const SKIP_SUBSTRINGS: &[&str] = &[
    "node_modules/",
    ".git/",
    "__pycache__/",
    ".ds_store",
    "venv/",
    ".venv/",
    "env/",
    ".env/",
    "target/",
    "build/",
    "dist/",
    ".next/",
];

const SKIP_GLOB_SUFFIXES: &[&str] = &["*.tmp", "*.temp", "*.cache", "*.log"];

/// True if `path` must never be staged based on its name alone.
///
/// `path` is relative to the worktree root and uses `/` separators.
/// Directories are passed with a trailing `/` so that directory patterns
/// (`node_modules/`) match the directory itself.
pub fn should_skip_path(path: &str) -> bool {
    let lower = path.to_lowercase();

    if SKIP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    if SKIP_SUBSTRINGS.iter().any(|pattern| lower.contains(pattern)) {
        return true;
    }
    SKIP_GLOB_SUFFIXES
        .iter()
        .filter_map(|glob| glob.strip_prefix('*'))
        .any(|suffix| lower.ends_with(suffix))
}

/// True if a sampled file prefix looks binary (contains NUL).
pub fn is_binary_prefix(prefix: &[u8]) -> bool {
    let sample = &prefix[..prefix.len().min(SNIFF_BYTES)];
    sample.contains(&0)
}
