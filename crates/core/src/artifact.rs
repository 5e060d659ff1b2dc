// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable side-products of a job run: diffs, test output, review notes.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for an artifact.
    pub struct ArtifactId;
}

/// What an artifact's bytes contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Plan,
    CodeReview,
    TestOutput,
    RebaseResult,
    RebaseConflict,
}

crate::simple_display! {
    ArtifactKind {
        Plan => "plan",
        CodeReview => "code_review",
        TestOutput => "test_output",
        RebaseResult => "rebase_result",
        RebaseConflict => "rebase_conflict",
    }
}

/// A single stored artifact, addressed by path on the artifact store's
/// filesystem (never inlined in the event log itself) and keyed by
/// `(job_id, kind, iteration)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub job_id: JobId,
    pub kind: ArtifactKind,
    pub iteration: u32,
    pub path: PathBuf,
    pub byte_len: u64,
    pub created_at_ms: u64,
}

impl Artifact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ArtifactId,
        job_id: JobId,
        kind: ArtifactKind,
        iteration: u32,
        path: PathBuf,
        byte_len: u64,
        created_at_ms: u64,
    ) -> Self {
        Self { id, job_id, kind, iteration, path, byte_len, created_at_ms }
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct ArtifactBuilder => Artifact {
        set {
            byte_len: u64 = 128,
            iteration: u32 = 0,
            kind: ArtifactKind = ArtifactKind::Plan,
            created_at_ms: u64 = 1_000_000,
        }
        computed { id: ArtifactId = ArtifactId::new("artifact-test") }
        computed { job_id: JobId = JobId::new("job-test") }
        computed { path: std::path::PathBuf = std::path::PathBuf::from("/tmp/artifact-test.patch") }
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
