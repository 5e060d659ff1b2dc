// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle event handlers.
//!
//! All handlers here must be idempotent: the executor applies an event
//! immediately for visibility and the daemon reapplies it from the WAL
//! on recovery, so applying the same event twice must be a no-op the
//! second time.

use apr_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobCreated { job } => {
            state.jobs.entry(job.id.to_string()).or_insert_with(|| job.clone());
        }

        Event::JobTransitioned { job_id, to, at_ms, .. } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                if job.state == *to {
                    return;
                }
                job.state = *to;
                job.updated_at_ms = *at_ms;
                if job.is_terminal() {
                    job.completed_at_ms.get_or_insert(*at_ms);
                }
            }
        }

        Event::JobIterationIncremented { job_id, iteration } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.iteration = job.iteration.max(*iteration);
            }
        }

        Event::JobWorktreeAssigned { job_id, worktree_path, branch_name } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.worktree_path = Some(worktree_path.clone());
                job.branch_name = Some(branch_name.clone());
            }
        }

        Event::JobWorktreeCleared { job_id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.worktree_path = None;
                job.updated_at_ms = *at_ms;
            }
        }

        Event::JobCommitRecorded { job_id, commit_sha, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.commit_sha = Some(commit_sha.clone());
                job.updated_at_ms = *at_ms;
            }
        }

        Event::JobPrOpened { job_id, pr_url, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.pr_url = Some(pr_url.clone());
                job.updated_at_ms = *at_ms;
            }
        }

        Event::JobPrMerged { job_id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.pr_merged_at_ms.get_or_insert(*at_ms);
            }
        }

        Event::JobPrClosed { job_id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.pr_closed_at_ms.get_or_insert(*at_ms);
            }
        }

        Event::JobCiStatusChanged { job_id, summary, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.ci_status_summary = Some(summary.clone());
                job.ci_started_at_ms.get_or_insert(*at_ms);
                job.ci_completed_at_ms = Some(*at_ms);
            }
        }

        Event::JobErrorRecorded { job_id, message, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.error_message = Some(message.clone());
                job.updated_at_ms = *at_ms;
            }
        }

        Event::JobRejected { job_id, reason, at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.reject_reason = Some(reason.clone());
                job.updated_at_ms = *at_ms;
            }
        }

        _ => {}
    }
}
