// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier, workflow state and the allowed-transition table.

use crate::issue::IssueId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a job (one execution of the pipeline state
    /// machine bound to a single issue).
    pub struct JobId;
}

/// The label attached to an LLM invocation ([`crate::session::Session`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Plan,
    Implement,
    CodeReview,
    ConflictResolution,
}

crate::simple_display! {
    StepKind {
        Plan => "plan",
        Implement => "implement",
        CodeReview => "code_review",
        ConflictResolution => "conflict_resolution",
    }
}

/// Workflow state of a job. See the module-level transition table
/// ([`TRANSITIONS`]) for the legal edges between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Planning,
    Implementing,
    Reviewing,
    Testing,
    Rebasing,
    ResolvingConflicts,
    Ready,
    AwaitingChecks,
    Approved,
    Merged,
    PrClosed,
    Rejected,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobState {
        Queued => "queued",
        Planning => "planning",
        Implementing => "implementing",
        Reviewing => "reviewing",
        Testing => "testing",
        Rebasing => "rebasing",
        ResolvingConflicts => "resolving_conflicts",
        Ready => "ready",
        AwaitingChecks => "awaiting_checks",
        Approved => "approved",
        Merged => "merged",
        PrClosed => "pr_closed",
        Rejected => "rejected",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobState {
    /// Terminal states admit no further automatic progress. `cancelled` is
    /// reachable from any non-terminal state; none of these are.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Merged
                | JobState::Rejected
                | JobState::Failed
                | JobState::Cancelled
                | JobState::PrClosed
        )
    }
}

/// The explicit, non-wildcard edges of the job state machine (§4.1).
///
/// Two wildcard rules are *not* represented here and are applied by
/// [`is_allowed_transition`] instead: any non-terminal state may move to
/// `failed` or to `cancelled`.
pub const TRANSITIONS: &[(JobState, JobState)] = &[
    (JobState::Queued, JobState::Planning),
    (JobState::Planning, JobState::Implementing),
    (JobState::Implementing, JobState::Reviewing),
    (JobState::Reviewing, JobState::Testing),
    (JobState::Reviewing, JobState::Implementing),
    (JobState::Testing, JobState::Rebasing),
    (JobState::Testing, JobState::Implementing),
    (JobState::Rebasing, JobState::Ready),
    (JobState::Rebasing, JobState::ResolvingConflicts),
    (JobState::ResolvingConflicts, JobState::Ready),
    (JobState::Ready, JobState::Approved),
    (JobState::Ready, JobState::Rejected),
    (JobState::Approved, JobState::AwaitingChecks),
    (JobState::AwaitingChecks, JobState::Approved),
    (JobState::AwaitingChecks, JobState::Rejected),
    (JobState::Approved, JobState::Merged),
    (JobState::Failed, JobState::Queued),
    (JobState::Rejected, JobState::Queued),
    (JobState::Cancelled, JobState::Queued),
];

/// Whether `from -> to` is a legal transition under the rules of §4.1.
///
/// This is a pure function over the static table plus the two wildcard
/// rules; the store uses it to reject illegal compare-and-set writes.
pub fn is_allowed_transition(from: JobState, to: JobState) -> bool {
    if to == JobState::Cancelled && !from.is_terminal() {
        return true;
    }
    if to == JobState::Failed && !from.is_terminal() {
        return true;
    }
    TRANSITIONS.iter().any(|&(a, b)| a == from && b == to)
}

/// Configuration captured when a job is created; immutable for the life of
/// the job except where the state machine explicitly rewrites a field
/// (worktree cleanup, retry reset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub issue_id: IssueId,
    pub project: String,
    pub max_iterations: u32,
}

impl JobConfig {
    pub fn new(issue_id: IssueId, project: impl Into<String>, max_iterations: u32) -> Self {
        Self { issue_id, project: project.into(), max_iterations }
    }
}

/// The central entity: one execution of the pipeline state machine bound
/// to a single issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub issue_id: IssueId,
    pub project: String,
    pub state: JobState,
    pub iteration: u32,
    pub max_iterations: u32,
    pub worktree_path: Option<PathBuf>,
    pub branch_name: Option<String>,
    pub commit_sha: Option<String>,
    pub pr_url: Option<String>,
    pub pr_merged_at_ms: Option<u64>,
    pub pr_closed_at_ms: Option<u64>,
    pub ci_started_at_ms: Option<u64>,
    pub ci_completed_at_ms: Option<u64>,
    pub ci_status_summary: Option<String>,
    pub error_message: Option<String>,
    pub reject_reason: Option<String>,
    pub completed_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Job {
    pub fn new(id: JobId, config: JobConfig, created_at_ms: u64) -> Self {
        Self {
            id,
            issue_id: config.issue_id,
            project: config.project,
            state: JobState::Queued,
            iteration: 0,
            max_iterations: config.max_iterations,
            worktree_path: None,
            branch_name: None,
            commit_sha: None,
            pr_url: None,
            pr_merged_at_ms: None,
            pr_closed_at_ms: None,
            ci_started_at_ms: None,
            ci_completed_at_ms: None,
            ci_status_summary: None,
            error_message: None,
            reject_reason: None,
            completed_at_ms: None,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// 8-character suffix used in human-facing output.
    pub fn short_id(&self) -> &str {
        self.id.short(8)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the job has exhausted its retry budget (invariant c).
    pub fn at_iteration_cap(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct JobBuilder => Job {
        into { project: String = "acme/widgets" }
        set { iteration: u32 = 0, max_iterations: u32 = 3 }
        option {
            worktree_path: PathBuf = None,
            branch_name: String = None,
            error_message: String = None
        }
        computed { id: JobId = JobId::new("job-test") }
        computed { issue_id: IssueId = IssueId::new("issue-test") }
        computed { state: JobState = JobState::Queued }
        computed { commit_sha: Option<String> = None }
        computed { pr_url: Option<String> = None }
        computed { pr_merged_at_ms: Option<u64> = None }
        computed { pr_closed_at_ms: Option<u64> = None }
        computed { ci_started_at_ms: Option<u64> = None }
        computed { ci_completed_at_ms: Option<u64> = None }
        computed { ci_status_summary: Option<String> = None }
        computed { reject_reason: Option<String> = None }
        computed { completed_at_ms: Option<u64> = None }
        computed { created_at_ms: u64 = 1_000_000 }
        computed { updated_at_ms: u64 = 1_000_000 }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
