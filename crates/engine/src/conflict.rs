// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tallies how many lines of conflict markers a stalled rebase left
//! behind, so the pipeline runner can decide whether the job is a
//! candidate for automatic conflict resolution or should fail outright.

use apr_adapters::git::{GitError, GitRunner};
use apr_adapters::resolve_no_symlink_path;
use apr_core::{parse_conflicts, render_conflicts, RedactionSecrets};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Conflicted files are capped at this size; anything larger is almost
/// certainly a generated or binary file and not worth feeding to a
/// provider as conflict detail.
const MAX_CONFLICTED_FILE_BYTES: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ConflictTallyError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("conflicted path escaped the safety root: {0}")]
    UnsafePath(#[from] apr_adapters::safe_path::SafePathError),
    #[error("io error reading conflicted file: {0}")]
    Io(#[from] std::io::Error),
}

/// Conflict-marker line count for a single file.
#[derive(Debug, Clone)]
pub struct FileConflictTally {
    pub path: String,
    pub lines: usize,
}

/// The aggregate conflict state of a stalled rebase.
#[derive(Debug, Clone, Default)]
pub struct ConflictTally {
    pub files: Vec<FileConflictTally>,
    pub total_lines: usize,
}

impl ConflictTally {
    /// A human-readable `path (N lines)` list, one per line, for use as
    /// the `{{conflict_files}}` prompt variable.
    pub fn file_summary(&self) -> String {
        self.files.iter().map(|f| format!("{} ({} lines)", f.path, f.lines)).collect::<Vec<_>>().join("\n")
    }

    /// The raw marker text of every conflicted file, concatenated, for
    /// use as the `{{conflict_details}}` prompt variable.
    pub fn details(&self, worktree_text: &[(String, String)]) -> String {
        worktree_text
            .iter()
            .map(|(path, text)| format!("--- {path} ---\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Enumerates every file `git` reports as conflicted in `worktree`, reads
/// each one (skipping anything too large or not a regular file), and
/// counts conflict-marker lines per file using [`render_conflicts`] to
/// re-derive the canonical marker span of each parsed region.
///
/// Returns the tally alongside the raw text of each conflicted file, so
/// the caller can both compare the tally against a threshold and build
/// the `{{conflict_details}}` prompt variable without reading the files
/// twice.
pub async fn tally_conflicts(
    worktree: &Path,
    safety_root: &Path,
    git: &GitRunner,
    cancel: &CancellationToken,
    secrets: &RedactionSecrets,
) -> Result<(ConflictTally, Vec<(String, String)>), ConflictTallyError> {
    let conflicted = git.conflicted_files(worktree, cancel, secrets).await?;

    let mut tally = ConflictTally::default();
    let mut raw_text = Vec::new();

    for relative_path in conflicted {
        let absolute = resolve_no_symlink_path(safety_root, &worktree.join(&relative_path))?;
        let metadata = tokio::fs::metadata(&absolute).await?;
        if !metadata.is_file() || metadata.len() > MAX_CONFLICTED_FILE_BYTES {
            continue;
        }

        let text = tokio::fs::read_to_string(&absolute).await?;
        let regions = parse_conflicts(&text);
        let lines: usize = regions.iter().map(|r| render_conflicts(std::slice::from_ref(r)).lines().count()).sum();

        tally.total_lines += lines;
        tally.files.push(FileConflictTally { path: relative_path.clone(), lines });
        raw_text.push((relative_path, text));
    }

    Ok((tally, raw_text))
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
