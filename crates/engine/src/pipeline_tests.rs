// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apr_adapters::provider::ProviderOutput;
use apr_core::{FakeClock, Issue, IssueId, IssueSource, IssueState, JobConfig, SequentialIdGen};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Command as StdCommand;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn git_identity_env() {
    for (k, v) in [
        ("GIT_AUTHOR_NAME", "test"),
        ("GIT_AUTHOR_EMAIL", "test@example.com"),
        ("GIT_COMMITTER_NAME", "test"),
        ("GIT_COMMITTER_EMAIL", "test@example.com"),
    ] {
        std::env::set_var(k, v);
    }
}

fn run_git(args: &[&str], cwd: &std::path::Path) {
    let out = StdCommand::new("git").args(args).current_dir(cwd).output().unwrap();
    assert!(out.status.success(), "git {:?} failed: {}", args, String::from_utf8_lossy(&out.stderr));
}

/// A bare "origin" repo seeded with one commit on `main`.
fn init_origin(dir: &std::path::Path) -> PathBuf {
    git_identity_env();
    let bare = dir.join("origin.git");
    run_git(&["init", "--bare", "-b", "main", bare.to_str().unwrap()], dir);

    let seed = dir.join("seed");
    run_git(&["clone", bare.to_str().unwrap(), seed.to_str().unwrap()], dir);
    std::fs::write(seed.join("README.md"), "hello\n").unwrap();
    run_git(&["add", "-A"], &seed);
    run_git(&["commit", "-m", "init"], &seed);
    run_git(&["push", "origin", "main"], &seed);
    bare
}

fn open_store(dir: &std::path::Path) -> Store<FakeClock> {
    Store::open(dir.join("wal.log"), None, FakeClock::new()).unwrap()
}

fn test_issue(id: &str) -> Issue {
    Issue {
        id: IssueId::new(id),
        source: IssueSource::GitHub,
        project: "acme/widgets".to_string(),
        number: 1,
        title: "Fix the thing".to_string(),
        body: "Steps to reproduce...".to_string(),
        labels: vec!["pipeline".to_string()],
        url: "https://github.com/acme/widgets/issues/1".to_string(),
        state: IssueState::Open,
        created_at_ms: 0,
        updated_at_ms: 0,
    }
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

fn base_config(repo_url: String, test_cmd: Option<String>) -> PipelineConfig {
    PipelineConfig {
        tool_name: "acme-bot".to_string(),
        repo_url,
        base_branch: "main".to_string(),
        test_cmd,
        max_auto_resolvable_conflict_lines: 20,
        auto_pr: false,
        plan_template_override: None,
        provider_name: "acme-cli".to_string(),
        merge_method: apr_adapters::MergeMethod::Squash,
    }
}

/// Hands out canned responses in order, one per `invoke_provider` call.
/// Tests drive the exact step sequence, so a flat queue is enough —
/// no need to branch on the step or prompt text.
struct ScriptedProvider {
    responses: Mutex<std::collections::VecDeque<&'static str>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: Vec<&'static str>) -> Self {
        Self { responses: Mutex::new(responses.into()), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn run(
        &self,
        _scope: &CancellationToken,
        _workdir: &std::path::Path,
        _prompt: &str,
        _transcript_path: &std::path::Path,
    ) -> Result<ProviderOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses.lock().pop_front().unwrap_or("APPROVED");
        Ok(ProviderOutput { response: response.to_string(), input_tokens: 10, output_tokens: 20, ..Default::default() })
    }
}

#[allow(clippy::too_many_arguments)]
fn runner(
    store: Arc<Store<FakeClock>>,
    repos_root: PathBuf,
    artifacts_root: PathBuf,
    provider: Arc<dyn Provider>,
    forge: Option<(Forge, ForgeClient)>,
    config: PipelineConfig,
) -> PipelineRunner<FakeClock> {
    PipelineRunner::new(
        store,
        GitRunner::new(repos_root),
        provider,
        forge,
        None,
        artifacts_root.clone(),
        artifacts_root.join("artifacts"),
        artifacts_root.join("transcripts"),
        config,
        FakeClock::new(),
        Arc::new(SequentialIdGen::new("t")),
    )
}

#[tokio::test]
async fn happy_path_runs_a_planned_job_to_ready() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-1");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-1"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec!["a plan", "implemented", "APPROVED"]));
    let config = base_config(origin.to_str().unwrap().to_string(), Some("true".to_string()));
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, None, config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    assert_eq!(final_job.state, JobState::Ready);
    assert!(final_job.commit_sha.is_some());
}

#[tokio::test]
async fn review_rejection_loops_back_to_implementing_then_caps_out_at_ready() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-2");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-2"), JobConfig::new(issue.id.clone(), "acme/widgets", 2)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();

    // plan, implement, review(reject), implement(retry), review -> cap reached at max_iterations=2
    let provider = Arc::new(ScriptedProvider::new(vec!["a plan", "implemented", "NOT APPROVED", "implemented again", "still NOT APPROVED"]));
    let config = base_config(origin.to_str().unwrap().to_string(), None);
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, None, config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    assert_eq!(final_job.state, JobState::Ready);
    assert_eq!(final_job.iteration, 1);
}

#[tokio::test]
async fn failing_test_command_routes_through_the_retry_loop() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-3");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-3"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec!["a plan", "implemented", "APPROVED", "implemented again", "APPROVED"]));
    let config = base_config(origin.to_str().unwrap().to_string(), Some("false".to_string()));
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, None, config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    // "false" always exits non-zero: bounces between testing and implementing
    // until the iteration cap routes it to ready for a human to look at.
    assert_eq!(final_job.state, JobState::Ready);
}

#[tokio::test]
async fn cancelled_job_is_marked_cancelled_instead_of_failed() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-4");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-4"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();
    store.transition_job(&job.id, JobState::Planning, JobState::Cancelled).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let config = base_config(origin.to_str().unwrap().to_string(), None);
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, None, config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    assert_eq!(final_job.state, JobState::Cancelled);
}

#[tokio::test]
async fn auto_pr_opens_a_pull_request_once_a_job_reaches_ready() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-5");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-5"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "html_url": "https://github.com/acme/widgets/pull/11"
        })))
        .mount(&server)
        .await;
    // One still-queued check run: the merge driver should park the job
    // in `awaiting_checks` rather than merging immediately.
    Mock::given(method("GET"))
        .and(path_regex(r"^/repos/acme/widgets/commits/.+/check-runs$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "check_runs": [{"name": "ci", "status": "queued", "conclusion": null, "html_url": null}]
        })))
        .mount(&server)
        .await;

    let forge = Forge::GitHub { api_base: server.uri(), owner: "acme".to_string(), repo: "widgets".to_string(), token: "t".to_string() };
    let client = ForgeClient::new(apr_adapters::retry::RetryPolicy::default());

    let provider = Arc::new(ScriptedProvider::new(vec!["a plan", "implemented", "APPROVED"]));
    let mut config = base_config(origin.to_str().unwrap().to_string(), Some("true".to_string()));
    config.auto_pr = true;
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, Some((forge, client)), config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    assert_eq!(final_job.state, JobState::AwaitingChecks);
    assert_eq!(final_job.pr_url.as_deref(), Some("https://github.com/acme/widgets/pull/11"));
    assert_eq!(final_job.ci_status_summary.as_deref(), Some("0 passed, 0 failed, 1 pending"));
}

#[tokio::test]
async fn a_pr_with_no_configured_checks_merges_immediately() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(open_store(dir.path()));

    let issue = test_issue("issue-6");
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-6"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();
    store.transition_job(&job.id, JobState::Queued, JobState::Planning).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/pulls"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "html_url": "https://github.com/acme/widgets/pull/12"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/repos/acme/widgets/commits/.+/check-runs$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "check_runs": [] })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/repos/acme/widgets/pulls/\d+/merge$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "merged": true })))
        .mount(&server)
        .await;

    let forge = Forge::GitHub { api_base: server.uri(), owner: "acme".to_string(), repo: "widgets".to_string(), token: "t".to_string() };
    let client = ForgeClient::new(apr_adapters::retry::RetryPolicy::default());

    let provider = Arc::new(ScriptedProvider::new(vec!["a plan", "implemented", "APPROVED"]));
    let mut config = base_config(origin.to_str().unwrap().to_string(), Some("true".to_string()));
    config.auto_pr = true;
    let runner = runner(store.clone(), dir.path().join("repos"), dir.path().join("work"), provider, Some((forge, client)), config);

    runner.run_job(&job.id, &cancel()).await.unwrap();

    let final_job = store.snapshot_state().get_job(job.id.as_str()).cloned().unwrap();
    assert_eq!(final_job.state, JobState::Merged);
}
