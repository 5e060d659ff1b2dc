// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.

mod artifacts;
mod helpers;
mod issues;
mod jobs;
mod sessions;

use apr_core::{Artifact, Event, Issue, Job, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Materialized state built from replaying [`Event`]s in order. This is
/// the store's read model: every query goes through here, never through
/// the WAL directly.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<String, Job>,
    pub sessions: HashMap<String, Session>,
    pub issues: HashMap<String, Issue>,
    pub artifacts: HashMap<String, Artifact>,
}

impl MaterializedState {
    /// Looks up a job by full id or unique short-id prefix.
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        helpers::find_by_prefix(&self.jobs, id)
    }

    pub fn get_issue(&self, id: &str) -> Option<&Issue> {
        helpers::find_by_prefix(&self.issues, id)
    }

    pub fn get_session(&self, id: &str) -> Option<&Session> {
        helpers::find_by_prefix(&self.sessions, id)
    }

    /// All jobs currently sitting in `queued`, oldest first — the order
    /// the worker pool claims from.
    pub fn queued_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> =
            self.jobs.values().filter(|j| j.state == apr_core::JobState::Queued).collect();
        jobs.sort_by_key(|j| j.created_at_ms);
        jobs
    }

    /// The artifact of `kind` for `job_id` from the highest iteration
    /// recorded so far, if any. Pipeline steps that read back the latest
    /// plan, review, or test output use this rather than scanning the
    /// whole table. Keyed on `iteration` rather than `created_at_ms`
    /// since a `FakeClock`-driven replay can produce several artifacts
    /// with an identical timestamp.
    pub fn latest_artifact(&self, job_id: &str, kind: apr_core::ArtifactKind) -> Option<&Artifact> {
        self.artifacts
            .values()
            .filter(|a| a.job_id.as_str() == job_id && a.kind == kind)
            .max_by_key(|a| a.iteration)
    }

    /// Applies an event to derive state changes.
    ///
    /// All handlers MUST be idempotent: applying the same event twice
    /// must produce the same state as applying it once, since events are
    /// applied both immediately (for visibility) and again during WAL
    /// replay on recovery.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::IssueIngested { .. } | Event::IssueClosed { .. } => issues::apply(self, event),

            Event::JobCreated { .. }
            | Event::JobTransitioned { .. }
            | Event::JobIterationIncremented { .. }
            | Event::JobWorktreeAssigned { .. }
            | Event::JobWorktreeCleared { .. }
            | Event::JobCommitRecorded { .. }
            | Event::JobPrOpened { .. }
            | Event::JobPrMerged { .. }
            | Event::JobPrClosed { .. }
            | Event::JobCiStatusChanged { .. }
            | Event::JobErrorRecorded { .. }
            | Event::JobRejected { .. } => jobs::apply(self, event),

            Event::SessionStarted { .. } | Event::SessionCompleted { .. } => {
                sessions::apply(self, event)
            }

            Event::ArtifactRecorded { .. } => artifacts::apply(self, event),

            // Control events carry no state change; the engine's runtime
            // loop observes them directly during replay.
            Event::TimerStart { .. } | Event::Shutdown => {}
        }
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
