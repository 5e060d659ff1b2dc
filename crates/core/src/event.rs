// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fact log: every state change in the system is recorded as an
//! `Event` before it takes effect. The WAL persists events in order; the
//! store's `MaterializedState` derives current state by replaying them.

use crate::artifact::Artifact;
use crate::issue::{Issue, IssueId};
use crate::job::{Job, JobId, JobState};
use crate::session::{Session, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Identifies a scheduled control timer (e.g. the cancellation
    /// watcher's poll tick). Carries no domain meaning of its own.
    pub struct TimerId;
}

/// A fact about something that happened. Handlers that apply events to
/// [`crate::job::Job`]/[`crate::session::Session`] state must be
/// idempotent: applying the same event twice must equal applying it once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    IssueIngested { issue: Issue },
    IssueClosed { issue_id: IssueId, at_ms: u64 },

    JobCreated { job: Job },
    JobTransitioned { job_id: JobId, from: JobState, to: JobState, at_ms: u64 },
    JobIterationIncremented { job_id: JobId, iteration: u32 },
    JobWorktreeAssigned { job_id: JobId, worktree_path: PathBuf, branch_name: String },
    JobWorktreeCleared { job_id: JobId, at_ms: u64 },
    JobCommitRecorded { job_id: JobId, commit_sha: String, at_ms: u64 },
    JobPrOpened { job_id: JobId, pr_url: String, at_ms: u64 },
    JobPrMerged { job_id: JobId, at_ms: u64 },
    JobPrClosed { job_id: JobId, at_ms: u64 },
    JobCiStatusChanged { job_id: JobId, summary: String, at_ms: u64 },
    JobErrorRecorded { job_id: JobId, message: String, at_ms: u64 },
    JobRejected { job_id: JobId, reason: String, at_ms: u64 },

    SessionStarted { session: Session },
    SessionCompleted {
        session_id: SessionId,
        status: SessionStatus,
        response: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
        commit_sha: Option<String>,
        at_ms: u64,
    },

    ArtifactRecorded { artifact: Artifact },

    /// Scheduled control tick, e.g. the cancellation watcher. Does not
    /// affect materialized state.
    TimerStart { id: TimerId },

    /// Graceful-shutdown marker. Persisted so a daemon that crashed
    /// mid-shutdown can recognize and skip it on WAL replay rather than
    /// re-running the shutdown sequence.
    Shutdown,
}

impl Event {
    /// Events that carry no materialized-state change; the engine's
    /// runtime loop still sees them on replay but the store applies them
    /// as a no-op.
    pub fn is_control(&self) -> bool {
        matches!(self, Event::TimerStart { .. } | Event::Shutdown)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
