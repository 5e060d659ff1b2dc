// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store façade: durable writes through the WAL, reads from
//! [`MaterializedState`], and compare-and-set job transitions that
//! enforce the state machine in [`apr_core::job`].

use crate::migration::MigrationRegistry;
use crate::snapshot;
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use apr_core::{
    is_allowed_transition, Artifact, Clock, CoreError, Event, Issue, Job, JobConfig, JobId,
    JobState, Session, SessionId, SessionStatus,
};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("job {job_id} is in state {actual}, expected {expected}")]
    StaleJobState { job_id: String, expected: JobState, actual: JobState },
}

/// Durable, replay-derived store of pipeline state.
///
/// Every mutation follows the same path: append the event to the WAL,
/// flush if needed, then apply it to the in-memory [`MaterializedState`].
/// On restart, [`Store::open`] loads the latest snapshot (if any) and
/// replays the WAL entries written after it.
pub struct Store<C: Clock> {
    wal: Mutex<Wal>,
    state: RwLock<MaterializedState>,
    clock: C,
    snapshot_path: Option<PathBuf>,
}

impl<C: Clock> Store<C> {
    pub fn open(
        wal_path: impl AsRef<Path>,
        snapshot_path: Option<PathBuf>,
        clock: C,
    ) -> Result<Self, StoreError> {
        let registry = MigrationRegistry::new();
        let (mut state, processed_seq) = match &snapshot_path {
            Some(path) => snapshot::load_snapshot(path, &registry)?.unwrap_or_default(),
            None => (MaterializedState::default(), 0),
        };

        let mut wal = Wal::open(wal_path, processed_seq)?;
        for entry in wal.entries_after(processed_seq)? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
        }

        Ok(Self { wal: Mutex::new(wal), state: RwLock::new(state), clock, snapshot_path })
    }

    /// A point-in-time copy of the materialized state for read-only
    /// queries. Cloning is cheap relative to holding the lock across a
    /// caller's query logic.
    pub fn snapshot_state(&self) -> MaterializedState {
        self.state.read().clone()
    }

    fn commit(&self, event: Event) -> Result<(), StoreError> {
        let mut wal = self.wal.lock();
        let seq = wal.append(&event)?;
        if wal.needs_flush() {
            wal.flush()?;
        }
        drop(wal);

        self.state.write().apply_event(&event);
        self.wal.lock().mark_processed(seq);
        Ok(())
    }

    /// Persists a compressed snapshot of the current state and truncates
    /// the WAL to entries after the snapshotted sequence.
    pub fn compact(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let mut wal = self.wal.lock();
        let seq = wal.processed_seq();
        let state = self.state.read().clone();
        snapshot::write_snapshot(path, &state, seq)?;
        wal.truncate_before(seq + 1)?;
        Ok(())
    }

    // --- Issues -----------------------------------------------------

    pub fn ingest_issue(&self, issue: Issue) -> Result<(), StoreError> {
        self.commit(Event::IssueIngested { issue })
    }

    pub fn close_issue(&self, issue_id: &apr_core::IssueId) -> Result<(), StoreError> {
        self.commit(Event::IssueClosed { issue_id: issue_id.clone(), at_ms: self.clock.epoch_ms() })
    }

    // --- Jobs ---------------------------------------------------------

    pub fn create_job(&self, id: JobId, config: JobConfig) -> Result<Job, StoreError> {
        let job = Job::new(id, config, self.clock.epoch_ms());
        self.commit(Event::JobCreated { job: job.clone() })?;
        Ok(job)
    }

    /// Compare-and-set state transition: fails with [`StoreError::StaleJobState`]
    /// if the job isn't currently in `from`, and with [`CoreError::InvalidTransition`]
    /// if `from -> to` isn't a legal edge, regardless of the job's actual state.
    pub fn transition_job(&self, job_id: &JobId, from: JobState, to: JobState) -> Result<(), StoreError> {
        if !is_allowed_transition(from, to) {
            return Err(CoreError::InvalidTransition { from, to }.into());
        }
        let actual = self
            .state
            .read()
            .get_job(job_id.as_str())
            .map(|j| j.state)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if actual != from {
            return Err(StoreError::StaleJobState { job_id: job_id.to_string(), expected: from, actual });
        }
        self.commit(Event::JobTransitioned { job_id: job_id.clone(), from, to, at_ms: self.clock.epoch_ms() })
    }

    /// Forces a job to `to`, transitioning from whatever state it is
    /// actually in rather than a caller-asserted `from`. A no-op if the
    /// job is already there. Used by outcome-recording methods where the
    /// caller knows the destination but not necessarily the job's exact
    /// current state (e.g. a rejection can fire from `ready` or from
    /// `awaiting_checks`).
    fn force_transition(&self, job_id: &JobId, to: JobState) -> Result<(), StoreError> {
        let actual = self
            .state
            .read()
            .get_job(job_id.as_str())
            .map(|j| j.state)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if actual == to {
            return Ok(());
        }
        self.transition_job(job_id, actual, to)
    }

    /// Unconditionally moves a job to `cancelled` from whatever
    /// non-terminal state it is actually in. A no-op if the job has
    /// already reached a terminal state.
    pub fn cancel_job(&self, job_id: &JobId) -> Result<(), StoreError> {
        let actual = self
            .state
            .read()
            .get_job(job_id.as_str())
            .map(|j| j.state)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        if actual.is_terminal() {
            return Ok(());
        }
        self.transition_job(job_id, actual, JobState::Cancelled)
    }

    /// Clears a job's worktree path after its checkout has been removed
    /// from disk. Idempotent: a job with no worktree assigned is left
    /// unchanged.
    pub fn clear_worktree(&self, job_id: &JobId) -> Result<(), StoreError> {
        self.commit(Event::JobWorktreeCleared { job_id: job_id.clone(), at_ms: self.clock.epoch_ms() })
    }

    /// Atomically claims the oldest `queued` job by transitioning it to
    /// `planning`, returning `None` if the queue is empty. This is the
    /// operation the worker pool calls to pick up work.
    pub fn claim_next_queued_job(&self) -> Result<Option<Job>, StoreError> {
        let candidate = {
            let state = self.state.read();
            state.queued_jobs().first().map(|j| j.id.clone())
        };
        let Some(job_id) = candidate else {
            return Ok(None);
        };
        match self.transition_job(&job_id, JobState::Queued, JobState::Planning) {
            Ok(()) => Ok(self.state.read().get_job(job_id.as_str()).cloned()),
            // Another worker claimed it between the read and the CAS; the
            // caller should just try again.
            Err(StoreError::StaleJobState { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn increment_iteration(&self, job_id: &JobId, iteration: u32) -> Result<(), StoreError> {
        self.commit(Event::JobIterationIncremented { job_id: job_id.clone(), iteration })
    }

    pub fn assign_worktree(&self, job_id: &JobId, worktree_path: PathBuf, branch_name: String) -> Result<(), StoreError> {
        self.commit(Event::JobWorktreeAssigned { job_id: job_id.clone(), worktree_path, branch_name })
    }

    pub fn record_commit(&self, job_id: &JobId, commit_sha: String) -> Result<(), StoreError> {
        self.commit(Event::JobCommitRecorded { job_id: job_id.clone(), commit_sha, at_ms: self.clock.epoch_ms() })
    }

    pub fn record_pr_opened(&self, job_id: &JobId, pr_url: String) -> Result<(), StoreError> {
        self.commit(Event::JobPrOpened { job_id: job_id.clone(), pr_url, at_ms: self.clock.epoch_ms() })
    }

    /// Records the merge and drives the job from `approved` into
    /// `merged`.
    pub fn record_pr_merged(&self, job_id: &JobId) -> Result<(), StoreError> {
        self.commit(Event::JobPrMerged { job_id: job_id.clone(), at_ms: self.clock.epoch_ms() })?;
        self.force_transition(job_id, JobState::Merged)
    }

    pub fn record_pr_closed(&self, job_id: &JobId) -> Result<(), StoreError> {
        self.commit(Event::JobPrClosed { job_id: job_id.clone(), at_ms: self.clock.epoch_ms() })
    }

    pub fn record_ci_status(&self, job_id: &JobId, summary: String) -> Result<(), StoreError> {
        self.commit(Event::JobCiStatusChanged { job_id: job_id.clone(), summary, at_ms: self.clock.epoch_ms() })
    }

    pub fn record_job_error(&self, job_id: &JobId, message: String) -> Result<(), StoreError> {
        self.commit(Event::JobErrorRecorded { job_id: job_id.clone(), message, at_ms: self.clock.epoch_ms() })
    }

    /// Records the rejection reason and drives the job into `rejected`,
    /// whether it came from `ready` (a human rejected the PR) or from
    /// `awaiting_checks` (a required check failed).
    pub fn record_rejection(&self, job_id: &JobId, reason: String) -> Result<(), StoreError> {
        self.commit(Event::JobRejected { job_id: job_id.clone(), reason, at_ms: self.clock.epoch_ms() })?;
        self.force_transition(job_id, JobState::Rejected)
    }

    // --- Sessions -------------------------------------------------------

    pub fn start_session(&self, session: Session) -> Result<(), StoreError> {
        self.commit(Event::SessionStarted { session })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn complete_session(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        response: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
        commit_sha: Option<String>,
    ) -> Result<(), StoreError> {
        self.commit(Event::SessionCompleted {
            session_id: session_id.clone(),
            status,
            response,
            input_tokens,
            output_tokens,
            commit_sha,
            at_ms: self.clock.epoch_ms(),
        })
    }

    // --- Artifacts --------------------------------------------------------

    pub fn record_artifact(&self, artifact: Artifact) -> Result<(), StoreError> {
        self.commit(Event::ArtifactRecorded { artifact })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
