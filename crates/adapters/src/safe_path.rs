// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves a path against a safety root, refusing symlinked or
//! escaping components. Used everywhere a job's worktree path is about
//! to be read, written, or deleted.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SafePathError {
    #[error("safety root does not exist or is not a directory")]
    RootInvalid,
    #[error("path contains a symlink component")]
    SymlinkComponent,
    #[error("resolved path escapes the safety root")]
    Escapes,
    #[error("io error resolving path: {0}")]
    Io(String),
}

/// Resolves `target` (an absolute or root-relative path) against `root`,
/// refusing to return a path that passes through a symlink or that
/// resolves outside `root`.
///
/// If `target` does not exist yet, its parent directory is canonicalized
/// instead and the final component is appended — this lets callers
/// resolve a path they are about to create.
pub fn resolve_no_symlink_path(root: &Path, target: &Path) -> Result<PathBuf, SafePathError> {
    let root = root.canonicalize().map_err(|_| SafePathError::RootInvalid)?;
    if !root.is_dir() {
        return Err(SafePathError::RootInvalid);
    }

    // Walk up from `target` to the longest existing ancestor (itself, if
    // it already exists), remembering the non-existent suffix so it can
    // be appended lexically once the existing prefix is canonicalized.
    let mut existing = target;
    let mut suffix: Vec<&std::ffi::OsStr> = Vec::new();
    while !existing.exists() {
        let Some(parent) = existing.parent() else {
            return Err(SafePathError::Escapes);
        };
        if let Some(name) = existing.file_name() {
            suffix.push(name);
        }
        existing = parent;
    }

    ensure_no_symlink_components(existing)?;
    let mut resolved = existing.canonicalize().map_err(|e| SafePathError::Io(e.to_string()))?;
    for name in suffix.into_iter().rev() {
        resolved.push(name);
    }

    if !resolved.starts_with(&root) {
        return Err(SafePathError::Escapes);
    }
    Ok(resolved)
}

fn ensure_no_symlink_components(path: &Path) -> Result<(), SafePathError> {
    let mut accum = PathBuf::new();
    for component in path.components() {
        accum.push(component);
        if let Ok(meta) = std::fs::symlink_metadata(&accum) {
            if meta.file_type().is_symlink() {
                return Err(SafePathError::SymlinkComponent);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "safe_path_tests.rs"]
mod tests;
