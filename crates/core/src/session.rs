// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single provider invocation bound to a job step.

use crate::job::{JobId, StepKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a session (one provider subprocess invocation).
    pub struct SessionId;
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

crate::simple_display! {
    SessionStatus {
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// One invocation of the provider process for a given job step.
///
/// The transcript itself is not held in memory; `log_path` points at the
/// JSONL transcript captured by the provider adapter. `prompt` and
/// `response` hold the same text the transcript already contains, kept
/// inline on the event so a session's inputs and outputs are queryable
/// without re-reading the transcript file from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub job_id: JobId,
    pub step: StepKind,
    pub iteration: u32,
    pub provider: String,
    pub status: SessionStatus,
    pub log_path: PathBuf,
    pub prompt: String,
    pub response: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub commit_sha: Option<String>,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        job_id: JobId,
        step: StepKind,
        iteration: u32,
        provider: impl Into<String>,
        prompt: impl Into<String>,
        log_path: PathBuf,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id,
            job_id,
            step,
            iteration,
            provider: provider.into(),
            status: SessionStatus::Running,
            log_path,
            prompt: prompt.into(),
            response: None,
            input_tokens: 0,
            output_tokens: 0,
            commit_sha: None,
            started_at_ms,
            ended_at_ms: None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at_ms.map(|end| end.saturating_sub(self.started_at_ms))
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct SessionBuilder => Session {
        into { provider: String = "acme-cli", prompt: String = "do the thing" }
        set { started_at_ms: u64 = 1_000_000, iteration: u32 = 0, input_tokens: u64 = 0, output_tokens: u64 = 0 }
        option { response: String = None, commit_sha: String = None }
        computed { id: SessionId = SessionId::new("session-test") }
        computed { job_id: JobId = JobId::new("job-test") }
        computed { step: StepKind = StepKind::Plan }
        computed { status: SessionStatus = SessionStatus::Running }
        computed { log_path: std::path::PathBuf = std::path::PathBuf::from("/tmp/session-test.jsonl") }
        computed { ended_at_ms: Option<u64> = None }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
