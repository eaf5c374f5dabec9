//! Recursive manifest discovery.
//!
//! Every detector finds its manifests through [`find_manifests`]. The walk
//! prunes any directory named in [`SKIP_DIRS`] so that vendored copies and
//! installed-package caches never reach a parser.

use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

/// Directory names that are never descended into.
pub const SKIP_DIRS: &[&str] = &[
    // version control
    ".git",
    ".hg",
    ".svn",
    // JavaScript / PHP / Ruby / Go vendoring
    "node_modules",
    "bower_components",
    "vendor",
    // Python
    "__pycache__",
    "venv",
    ".venv",
    "env",
    "virtualenv",
    ".tox",
    // Rust / JVM / .NET build output
    "target",
    "build",
    "dist",
    ".gradle",
    "gradle",
    "obj",
    "bin",
    // C/C++ and embedded package caches
    "vcpkg_installed",
    ".pio",
    // IDEs
    ".idea",
    ".vs",
    ".vscode",
];

/// Returns every file below `root` whose name matches one of `patterns`.
///
/// Patterns are plain file names or `*` globs matched against the file name.
/// Unreadable entries are skipped, and the result is sorted by path so that
/// discovery order is deterministic.
pub fn find_manifests(root: &Path, patterns: &[&str]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry));

    let mut found: Vec<PathBuf> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let file_name = entry.file_name().to_string_lossy();
            patterns.iter().any(|pattern| matches_pattern(pattern, &file_name))
        })
        .map(DirEntry::into_path)
        .collect();

    found.sort();
    debug!(root = %root.display(), ?patterns, count = found.len(), "Located manifests");
    found
}

/// Path of `path` relative to `root`, falling back to `path` itself.
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    // the scan root itself is always walked, whatever its name
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    let skipped = SKIP_DIRS.contains(&name.as_ref());
    if skipped {
        trace!(path = %entry.path().display(), "skipping directory");
    }
    skipped
}

fn matches_pattern(pattern: &str, file_name: &str) -> bool {
    if pattern.contains('*') {
        glob_match(pattern, file_name)
    } else {
        pattern == file_name
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    let first = parts[0];
    if !first.is_empty() {
        match remaining.strip_prefix(first) {
            Some(rest) => remaining = rest,
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if !last.is_empty() {
        match remaining.strip_suffix(last) {
            Some(rest) => remaining = rest,
            None => return false,
        }
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }

    true
}
