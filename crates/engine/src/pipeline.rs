// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pipeline runner: drives one job through the state machine
//! described in §4.5 of the design, one step per call to [`PipelineRunner::run_job`]
//! iteration, until it reaches a terminal or human-handoff state.
//!
//! Step dispatch is a small ordered table rather than a trait per step:
//! there is exactly one concrete workflow here, and a `match` over
//! [`JobState`] reads closer to the state diagram than a class hierarchy
//! would.

use crate::autopr;
use crate::cancellation::job_is_cancelled;
use crate::conflict::tally_conflicts;
use crate::prompt::{render_prompt, PromptKind, PromptVars};
use crate::sanitize::sanitize_issue_body;
use apr_adapters::credential::GitCredential;
use apr_adapters::forge::{parse_pr_number, CheckRunSummary, Forge, ForgeClient, MergeMethod};
use apr_adapters::git::{GitError, GitRunner, RebaseOutcome};
use apr_adapters::provider::{Provider, ProviderError};
use apr_core::{
    Artifact, ArtifactId, ArtifactKind, Clock, IdGen, Job, JobId, JobState, RedactionSecrets,
    Session, SessionId, SessionStatus, StepKind,
};
use apr_shell::{run_test_command, ShellError};
use apr_storage::{Store, StoreError};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("issue {0} not found")]
    IssueNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Forge(#[from] apr_adapters::forge::ForgeError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error(transparent)]
    Conflict(#[from] crate::conflict::ConflictTallyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("run was cancelled")]
    Cancelled,
    #[error("a second round of conflicts arose during single-shot auto-resolution")]
    SecondConflictPhase,
    #[error("tests failed after a clean rebase")]
    TestsFailedAfterRebase,
}

/// Project- and daemon-level knobs the runner needs for one job. Built
/// once per project bundle; shared across every job run against it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tool_name: String,
    pub repo_url: String,
    pub base_branch: String,
    pub test_cmd: Option<String>,
    pub max_auto_resolvable_conflict_lines: u64,
    pub auto_pr: bool,
    pub plan_template_override: Option<PathBuf>,
    /// Recorded on each [`apr_core::Session`] so provider invocations
    /// stay attributable once a project switches CLIs.
    pub provider_name: String,
    /// How an approved PR with clean checks is merged.
    pub merge_method: MergeMethod,
}

/// Which canned workflow step a [`JobState`] dispatches to. `Ready` maps
/// to `AutoPr` only when the project has auto-PR configured; otherwise
/// `Ready` is left for a human and the runner simply stops. `Approved`
/// and `AwaitingChecks` poll the forge for CI status and either merge or
/// hand off to the next check-poll; they can return without changing
/// state, which the run loop's no-progress guard treats as a stopping
/// point rather than a step to retry immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Plan,
    Implement,
    CodeReview,
    Tests,
    Rebase,
    ResolveConflicts,
    AutoPr,
    Approved,
    AwaitingChecks,
}

const STEP_TABLE: &[(JobState, Step)] = &[
    (JobState::Planning, Step::Plan),
    (JobState::Implementing, Step::Implement),
    (JobState::Reviewing, Step::CodeReview),
    (JobState::Testing, Step::Tests),
    (JobState::Rebasing, Step::Rebase),
    (JobState::ResolvingConflicts, Step::ResolveConflicts),
    (JobState::Ready, Step::AutoPr),
    (JobState::Approved, Step::Approved),
    (JobState::AwaitingChecks, Step::AwaitingChecks),
];

fn step_for(state: JobState) -> Option<Step> {
    STEP_TABLE.iter().find(|(s, _)| *s == state).map(|(_, step)| *step)
}

/// Drives the state machine for one job to completion (a terminal state,
/// a human-handoff state, or cancellation).
pub struct PipelineRunner<C: Clock> {
    store: Arc<Store<C>>,
    git: GitRunner,
    provider: Arc<dyn Provider>,
    forge: Option<(Forge, ForgeClient)>,
    credential: Option<GitCredential>,
    repos_root: PathBuf,
    artifacts_root: PathBuf,
    transcripts_root: PathBuf,
    config: PipelineConfig,
    clock: C,
    id_gen: Arc<dyn IdGen + Send + Sync>,
    secrets: RedactionSecrets,
}

impl<C: Clock> PipelineRunner<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store<C>>,
        git: GitRunner,
        provider: Arc<dyn Provider>,
        forge: Option<(Forge, ForgeClient)>,
        credential: Option<GitCredential>,
        repos_root: PathBuf,
        artifacts_root: PathBuf,
        transcripts_root: PathBuf,
        config: PipelineConfig,
        clock: C,
        id_gen: Arc<dyn IdGen + Send + Sync>,
    ) -> Self {
        let secrets = match &credential {
            Some(cred) => RedactionSecrets::new().with_secret(cred.password.clone()),
            None => RedactionSecrets::new(),
        };
        Self {
            store,
            git,
            provider,
            forge,
            credential,
            repos_root,
            artifacts_root,
            transcripts_root,
            config,
            clock,
            id_gen,
            secrets,
        }
    }

    /// Runs `job_id` step by step until it stops changing state: a
    /// terminal state, `ready` with no auto-PR configured, or a
    /// cancellation.
    pub async fn run_job(&self, job_id: &JobId, cancel: &CancellationToken) -> Result<(), PipelineError> {
        loop {
            let job = self.load_job(job_id)?;

            if job.state.is_terminal() {
                return Ok(());
            }
            if cancel.is_cancelled() || job_is_cancelled(&self.store, job_id) {
                self.mark_cancelled(&job).await?;
                return Ok(());
            }

            let Some(step) = step_for(job.state) else { return Ok(()) };
            if step == Step::AutoPr && !self.config.auto_pr {
                return Ok(());
            }

            let before_state = job.state;
            let result = match step {
                Step::Plan => self.step_plan(&job, cancel).await,
                Step::Implement => self.step_implement(&job, cancel).await,
                Step::CodeReview => self.step_code_review(&job, cancel).await,
                Step::Tests => self.step_tests(&job, cancel).await,
                Step::Rebase => self.step_rebase(&job, cancel).await,
                Step::ResolveConflicts => self.step_resolve_conflicts(&job, cancel).await,
                Step::AutoPr => self.step_auto_pr(&job, cancel).await,
                Step::Approved => self.step_approved(&job, cancel).await,
                Step::AwaitingChecks => self.step_awaiting_checks(&job, cancel).await,
            };

            if let Err(err) = result {
                if is_cancellation(&err) || job_is_cancelled(&self.store, job_id) {
                    self.mark_cancelled(&job).await?;
                    return Ok(());
                }
                self.fail_job(job_id, before_state, &err)?;
                return Err(err);
            }

            // `Approved`/`AwaitingChecks` can legitimately return `Ok`
            // without moving the job (checks still pending); stop here
            // rather than re-polling the forge in a tight loop within a
            // single `run_job` call.
            let after_state = self.load_job(job_id)?.state;
            if after_state == before_state {
                return Ok(());
            }
        }
    }

    fn load_job(&self, job_id: &JobId) -> Result<Job, PipelineError> {
        self.store
            .snapshot_state()
            .get_job(job_id.as_str())
            .cloned()
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))
    }

    /// Any uncategorised error is funneled here: transition to `failed`,
    /// stamp `error_message`. Swallows a stale-state race (the job may
    /// have been cancelled or re-claimed concurrently).
    fn fail_job(&self, job_id: &JobId, from: JobState, err: &PipelineError) -> Result<(), PipelineError> {
        match self.store.transition_job(job_id, from, JobState::Failed) {
            Ok(()) | Err(StoreError::StaleJobState { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.store.record_job_error(job_id, err.to_string())?;
        Ok(())
    }

    /// `MarkRunningSessionsCancelled`: every session sweep is a no-op
    /// here since sessions are completed synchronously around each
    /// provider call; a cancellation observed mid-call surfaces as a
    /// `ProviderError` on the in-flight `run()` future, which the caller
    /// already completes as `Cancelled` before this is reached.
    ///
    /// Also best-effort removes the job's worktree from disk, since a
    /// cancelled job is never resumed from the same checkout.
    async fn mark_cancelled(&self, job: &Job) -> Result<(), PipelineError> {
        self.store.cancel_job(&job.id)?;
        if let Some(path) = &job.worktree_path {
            let _ = tokio::fs::remove_dir_all(path).await;
            self.store.clear_worktree(&job.id)?;
        }
        Ok(())
    }

    fn worktree(&self, job: &Job) -> Result<PathBuf, PipelineError> {
        job.worktree_path.clone().ok_or_else(|| PipelineError::JobNotFound(job.id.to_string()))
    }

    async fn write_artifact(&self, job: &Job, kind: ArtifactKind, contents: &[u8]) -> Result<Artifact, PipelineError> {
        let dir = self.artifacts_root.join(job.id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let file_name = format!("{kind}-iter{}-{}.txt", job.iteration, self.id_gen.next());
        let path = dir.join(file_name);
        tokio::fs::write(&path, contents).await?;

        let artifact = Artifact::new(
            ArtifactId::new(self.id_gen.next()),
            job.id.clone(),
            kind,
            job.iteration,
            path,
            contents.len() as u64,
            self.clock.epoch_ms(),
        );
        self.store.record_artifact(artifact.clone())?;
        Ok(artifact)
    }

    fn transcript_path(&self, job: &Job, step: StepKind) -> PathBuf {
        self.transcripts_root.join(format!("{}-{}-iter{}.jsonl", job.id.as_str(), step, job.iteration))
    }

    /// Runs one provider invocation for `step`, bookended by a session
    /// start/completion pair. A panic inside `provider.run` is not
    /// caught here — the worker pool's own panic boundary is the layer
    /// responsible for that (§4.6) — but every other exit path, success
    /// or error, closes the session exactly once.
    async fn invoke_provider(
        &self,
        job: &Job,
        step: StepKind,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<apr_adapters::provider::ProviderOutput, PipelineError> {
        let worktree = self.worktree(job)?;
        let transcript_path = self.transcript_path(job, step);
        let session_id = SessionId::new(self.id_gen.next());
        let session = Session::new(
            session_id.clone(),
            job.id.clone(),
            step,
            job.iteration,
            self.config.provider_name.clone(),
            prompt,
            transcript_path.clone(),
            self.clock.epoch_ms(),
        );
        self.store.start_session(session)?;

        match self.provider.run(cancel, &worktree, prompt, &transcript_path).await {
            Ok(output) => {
                self.store.complete_session(
                    &session_id,
                    SessionStatus::Succeeded,
                    Some(output.response.clone()),
                    output.input_tokens,
                    output.output_tokens,
                    output.commit_sha.clone(),
                )?;
                Ok(output)
            }
            Err(ProviderError::Cancelled) => {
                self.store.complete_session(&session_id, SessionStatus::Cancelled, None, 0, 0, None)?;
                Err(PipelineError::Cancelled)
            }
            Err(err) => {
                self.store.complete_session(&session_id, SessionStatus::Failed, Some(err.to_string()), 0, 0, None)?;
                Err(err.into())
            }
        }
    }

    // --- plan -----------------------------------------------------------

    async fn step_plan(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let worktree = self.ensure_worktree(job, cancel).await?;
        let mut job = job.clone();
        job.worktree_path = Some(worktree);

        let issue = self
            .store
            .snapshot_state()
            .get_issue(job.issue_id.as_str())
            .cloned()
            .ok_or_else(|| PipelineError::IssueNotFound(job.issue_id.to_string()))?;

        let vars = PromptVars::new().title(issue.title.clone()).body(sanitize_issue_body(&issue.body));
        let prompt = render_prompt(PromptKind::Plan, &vars, self.config.plan_template_override.as_deref())?;

        let output = self.invoke_provider(&job, StepKind::Plan, &prompt, cancel).await?;
        self.write_artifact(&job, ArtifactKind::Plan, output.response.as_bytes()).await?;

        self.store.transition_job(&job.id, JobState::Planning, JobState::Implementing)?;
        Ok(())
    }

    async fn ensure_worktree(&self, job: &Job, cancel: &CancellationToken) -> Result<PathBuf, PipelineError> {
        if let Some(path) = &job.worktree_path {
            return Ok(path.clone());
        }
        let worktree = self
            .git
            .clone_for_job(&self.config.repo_url, &self.config.base_branch, job.id.short(12), self.credential.as_ref(), cancel, &self.secrets)
            .await?;
        let branch = format!("apr/{}", job.id.short(12));
        self.git.checkout_new_branch(&worktree, &branch, cancel, &self.secrets).await?;
        self.store.assign_worktree(&job.id, worktree.clone(), branch)?;
        Ok(worktree)
    }

    // --- implement --------------------------------------------------------

    async fn step_implement(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let worktree = self.worktree(job)?;
        let state = self.store.snapshot_state();
        let issue = state.get_issue(job.issue_id.as_str()).cloned().ok_or_else(|| PipelineError::IssueNotFound(job.issue_id.to_string()))?;
        let plan = state.latest_artifact(job.id.as_str(), ArtifactKind::Plan).cloned();
        let plan_text = match &plan {
            Some(a) => tokio::fs::read_to_string(&a.path).await.unwrap_or_default(),
            None => String::new(),
        };

        let mut prompt = render_prompt(
            PromptKind::Implement,
            &PromptVars::new().title(issue.title.clone()).plan(plan_text.clone()),
            None,
        )?;

        if job.iteration > 0 {
            let review = state.latest_artifact(job.id.as_str(), ArtifactKind::CodeReview).cloned();
            let tests = state.latest_artifact(job.id.as_str(), ArtifactKind::TestOutput).cloned();
            if let Some(a) = review {
                let text = tokio::fs::read_to_string(&a.path).await.unwrap_or_default();
                prompt.push_str(&format!("\n\n<review_feedback>\n{text}\n</review_feedback>"));
            }
            if let Some(a) = tests {
                let text = tokio::fs::read_to_string(&a.path).await.unwrap_or_default();
                prompt.push_str(&format!("\n\n<test_output>\n{text}\n</test_output>"));
            }
        }

        self.invoke_provider(job, StepKind::Implement, &prompt, cancel).await?;

        let message = format!("{}: implement {} (iteration {})", self.config.tool_name, issue.title, job.iteration);
        match self.git.commit_all(&worktree, &message, cancel, &self.secrets).await {
            Ok(sha) => {
                self.store.record_commit(&job.id, sha)?;
            }
            Err(GitError::NothingToCommit) => {
                if let Some(sha) = self.git.head_sha(&worktree, cancel, &self.secrets).await {
                    self.store.record_commit(&job.id, sha)?;
                }
            }
            Err(e) => return Err(e.into()),
        }

        self.store.transition_job(&job.id, JobState::Implementing, JobState::Reviewing)?;
        Ok(())
    }

    // --- code review ------------------------------------------------------

    async fn step_code_review(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let state = self.store.snapshot_state();
        let plan = state.latest_artifact(job.id.as_str(), ArtifactKind::Plan).cloned();
        let plan_text = match &plan {
            Some(a) => tokio::fs::read_to_string(&a.path).await.unwrap_or_default(),
            None => String::new(),
        };

        let prompt = render_prompt(PromptKind::CodeReview, &PromptVars::new().plan(plan_text), None)?;
        let output = self.invoke_provider(job, StepKind::CodeReview, &prompt, cancel).await?;
        self.write_artifact(job, ArtifactKind::CodeReview, output.response.as_bytes()).await?;

        if review_approved(&output.response) {
            self.store.transition_job(&job.id, JobState::Reviewing, JobState::Testing)?;
        } else {
            self.enter_retry_loop(job, JobState::Reviewing).await?;
        }
        Ok(())
    }

    // --- tests --------------------------------------------------------

    async fn step_tests(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let worktree = self.worktree(job)?;

        let Some(test_cmd) = &self.config.test_cmd else {
            self.write_artifact(job, ArtifactKind::TestOutput, b"no test command configured").await?;
            self.store.transition_job(&job.id, JobState::Testing, JobState::Rebasing)?;
            return Ok(());
        };

        let output = run_test_command(test_cmd, &worktree, cancel).await?;
        self.write_artifact(job, ArtifactKind::TestOutput, &output.combined_output).await?;

        if output.passed() {
            self.store.transition_job(&job.id, JobState::Testing, JobState::Rebasing)?;
        } else {
            self.enter_retry_loop(job, JobState::Testing).await?;
        }
        Ok(())
    }

    /// Shared by the review and test steps: bump `iteration`, and either
    /// hand off to a human at `ready` (iteration cap reached) or loop
    /// back to `implementing`.
    async fn enter_retry_loop(&self, job: &Job, from: JobState) -> Result<(), PipelineError> {
        let next_iteration = job.iteration + 1;
        if next_iteration >= job.max_iterations {
            self.store.transition_job(&job.id, from, JobState::Ready)?;
            return Ok(());
        }
        self.store.transition_job(&job.id, from, JobState::Implementing)?;
        self.store.increment_iteration(&job.id, next_iteration)?;
        Ok(())
    }

    // --- rebase / conflict resolution --------------------------------------

    async fn step_rebase(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let worktree = self.worktree(job)?;

        match self.git.rebase_onto_base(&worktree, &self.config.base_branch, cancel, &self.secrets).await? {
            RebaseOutcome::NoOp => {
                let msg = format!("No-op: branch already up to date with {}", self.config.base_branch);
                self.write_artifact(job, ArtifactKind::RebaseResult, msg.as_bytes()).await?;
                self.store.transition_job(&job.id, JobState::Rebasing, JobState::Ready)?;
            }
            RebaseOutcome::Clean { before_sha, after_sha } => {
                let msg = format!("Rebased cleanly: {before_sha} -> {after_sha}");
                self.write_artifact(job, ArtifactKind::RebaseResult, msg.as_bytes()).await?;
                self.rerun_tests_then_ready(job, cancel).await?;
            }
            RebaseOutcome::Conflicts => {
                self.handle_conflicts(job, cancel, false).await?;
            }
        }
        Ok(())
    }

    async fn rerun_tests_then_ready(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let worktree = self.worktree(job)?;
        if let Some(test_cmd) = &self.config.test_cmd {
            let output = run_test_command(test_cmd, &worktree, cancel).await?;
            self.write_artifact(job, ArtifactKind::TestOutput, &output.combined_output).await?;
            if !output.passed() {
                // Tests failing after a clean rebase isn't one of the named
                // retry-loop states in the diagram; it routes straight to
                // the failure funnel instead.
                return Err(PipelineError::TestsFailedAfterRebase);
            }
        }
        let from = self.load_job(&job.id)?.state;
        self.store.transition_job(&job.id, from, JobState::Ready)?;
        Ok(())
    }

    /// Boxed because this recurses once, for the single-shot retry after
    /// a second conflict phase; a plain `async fn` calling itself can't
    /// express a finite future type.
    fn handle_conflicts<'a>(
        &'a self,
        job: &'a Job,
        cancel: &'a CancellationToken,
        second_phase: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>> {
        Box::pin(async move {
            let worktree = self.worktree(job)?;
            let (tally, raw_files) = tally_conflicts(&worktree, &self.repos_root, &self.git, cancel, &self.secrets).await?;

            let summary = format!(
                "{} conflicted file(s), {} total conflict line(s):\n{}",
                tally.files.len(),
                tally.total_lines,
                tally.file_summary()
            );
            self.write_artifact(job, ArtifactKind::RebaseConflict, summary.as_bytes()).await?;

            if second_phase {
                self.git.rebase_abort(&worktree, cancel, &self.secrets).await.ok();
                return Err(PipelineError::SecondConflictPhase);
            }

            if tally.total_lines as u64 >= self.config.max_auto_resolvable_conflict_lines {
                self.git.rebase_abort(&worktree, cancel, &self.secrets).await.ok();
                return Err(GitError::RebaseConflicts.into());
            }

            if self.load_job(&job.id)?.state == JobState::Rebasing {
                self.store.transition_job(&job.id, JobState::Rebasing, JobState::ResolvingConflicts)?;
            }

            let conflict_files = tally.file_summary();
            let conflict_details = tally.details(&raw_files);
            let prompt = render_prompt(
                PromptKind::ResolveConflicts,
                &PromptVars::new().base_branch(self.config.base_branch.clone()).conflict_files(conflict_files).conflict_details(conflict_details),
                None,
            )?;

            let resolved = self.load_job(&job.id)?;
            self.invoke_provider(&resolved, StepKind::ConflictResolution, &prompt, cancel).await?;

            let still_conflicted = self.git.conflicted_files(&worktree, cancel, &self.secrets).await?;
            if !still_conflicted.is_empty() {
                self.git.rebase_abort(&worktree, cancel, &self.secrets).await.ok();
                return Err(GitError::RebaseConflicts.into());
            }

            self.git.commit_all(&worktree, "resolve conflicts", cancel, &self.secrets).await.ok();
            self.git.rebase_continue(&worktree, cancel, &self.secrets).await?;

            match self.git.conflicted_files(&worktree, cancel, &self.secrets).await {
                Ok(remaining) if !remaining.is_empty() => {
                    self.handle_conflicts(&resolved, cancel, true).await?;
                }
                Ok(_) => {
                    self.rerun_tests_then_ready(&resolved, cancel).await?;
                }
                Err(e) => return Err(e.into()),
            }
            Ok(())
        })
    }

    async fn step_resolve_conflicts(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        // Entry into `resolving_conflicts` is driven entirely from within
        // `handle_conflicts`; if the runner is re-entered in this state
        // (e.g. after a restart), the only safe thing is to re-tally and
        // retry the single-shot resolution once more.
        self.handle_conflicts(job, cancel, false).await
    }

    // --- auto-pr ------------------------------------------------------

    async fn step_auto_pr(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let Some((forge, client)) = &self.forge else {
            return Ok(());
        };
        let worktree = self.worktree(job)?;
        let branch = job.branch_name.clone().ok_or_else(|| PipelineError::JobNotFound(job.id.to_string()))?;

        if let Some(credential) = &self.credential {
            self.git.push(&worktree, credential, &branch, false, cancel, &self.secrets).await?;
        }

        let state = self.store.snapshot_state();
        let issue = state.get_issue(job.issue_id.as_str()).cloned().ok_or_else(|| PipelineError::IssueNotFound(job.issue_id.to_string()))?;
        let plan = state.latest_artifact(job.id.as_str(), ArtifactKind::Plan).cloned();
        let plan_text = match &plan {
            Some(a) => tokio::fs::read_to_string(&a.path).await.ok(),
            None => None,
        };

        let title = autopr::pr_title(&issue.title);
        let body = autopr::pr_body(&issue.url, plan_text.as_deref(), job.short_id());

        let pr_url = client.create_or_find_pr(forge, &branch, &self.config.base_branch, &title, &body, cancel).await?;
        self.store.record_pr_opened(&job.id, pr_url)?;
        self.store.transition_job(&job.id, JobState::Ready, JobState::Approved)?;
        Ok(())
    }

    // --- ci poll / merge ------------------------------------------------

    /// Entry point once a PR is open: checks CI status for the head
    /// commit and either merges immediately (no checks configured) or
    /// hands off to `awaiting_checks` to wait for them.
    async fn step_approved(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let Some((forge, client)) = &self.forge else {
            return Ok(());
        };
        let checks = match &job.commit_sha {
            Some(sha) => client.check_runs_for_ref(forge, sha, cancel).await?,
            None => CheckRunSummary::default(),
        };

        if checks.total() == 0 {
            return self.attempt_merge(job, forge, client, cancel).await;
        }

        self.store.record_ci_status(&job.id, ci_summary_text(&checks))?;
        self.store.transition_job(&job.id, JobState::Approved, JobState::AwaitingChecks)?;
        Ok(())
    }

    /// Re-polls CI status for a job already waiting on checks: stays put
    /// while anything is still pending, rejects on a failed check, or
    /// hands back to `approved` once everything has passed.
    async fn step_awaiting_checks(&self, job: &Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let Some((forge, client)) = &self.forge else {
            return Ok(());
        };
        let Some(sha) = &job.commit_sha else {
            return Ok(());
        };
        let checks = client.check_runs_for_ref(forge, sha, cancel).await?;
        self.store.record_ci_status(&job.id, ci_summary_text(&checks))?;

        if checks.pending > 0 {
            return Ok(());
        }
        if checks.failed > 0 {
            let reason = checks
                .first_failed
                .as_ref()
                .map(|(name, _)| format!("required check {name} failed"))
                .unwrap_or_else(|| "a required check failed".to_string());
            self.store.record_rejection(&job.id, reason)?;
            return Ok(());
        }
        self.store.transition_job(&job.id, JobState::AwaitingChecks, JobState::Approved)?;
        Ok(())
    }

    async fn attempt_merge(
        &self,
        job: &Job,
        forge: &Forge,
        client: &ForgeClient,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let pr_url = job.pr_url.clone().ok_or_else(|| PipelineError::JobNotFound(job.id.to_string()))?;
        let number = parse_pr_number(&pr_url)?;
        client.merge_pr(forge, number, self.config.merge_method, cancel).await?;
        self.store.record_pr_merged(&job.id)?;
        Ok(())
    }
}

fn ci_summary_text(checks: &CheckRunSummary) -> String {
    format!("{} passed, {} failed, {} pending", checks.passed, checks.failed, checks.pending)
}

fn review_approved(response: &str) -> bool {
    let upper = response.to_ascii_uppercase();
    upper.contains("APPROVED") && !upper.contains("NOT APPROVED") && !upper.contains("NOT YET APPROVED")
}

fn is_cancellation(err: &PipelineError) -> bool {
    matches!(err, PipelineError::Cancelled | PipelineError::Provider(ProviderError::Cancelled) | PipelineError::Git(GitError::Cancelled))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
