// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apr_adapters::{GitRunner, Provider, ProviderError, ProviderOutput};
use apr_core::{Issue, IssueId, IssueSource, IssueState, JobConfig, SequentialIdGen};
use apr_engine::PipelineConfig;
use async_trait::async_trait;
use std::process::Command as StdCommand;
use std::time::Duration;
use tempfile::tempdir;

struct AlwaysApprove;

#[async_trait]
impl Provider for AlwaysApprove {
    async fn run(
        &self,
        _scope: &CancellationToken,
        _workdir: &std::path::Path,
        _prompt: &str,
        _transcript_path: &std::path::Path,
    ) -> Result<ProviderOutput, ProviderError> {
        Ok(ProviderOutput { response: "APPROVED".to_string(), ..Default::default() })
    }
}

fn run_git(args: &[&str], cwd: &std::path::Path) {
    for (k, v) in [
        ("GIT_AUTHOR_NAME", "test"),
        ("GIT_AUTHOR_EMAIL", "test@example.com"),
        ("GIT_COMMITTER_NAME", "test"),
        ("GIT_COMMITTER_EMAIL", "test@example.com"),
    ] {
        std::env::set_var(k, v);
    }
    let out = StdCommand::new("git").args(args).current_dir(cwd).output().unwrap();
    assert!(out.status.success(), "git {:?} failed: {}", args, String::from_utf8_lossy(&out.stderr));
}

fn init_origin(dir: &std::path::Path) -> std::path::PathBuf {
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

#[tokio::test]
async fn claims_and_runs_a_queued_job_to_ready() {
    let dir = tempdir().unwrap();
    let origin = init_origin(dir.path());
    let store = Arc::new(Store::open(dir.path().join("wal.log"), None, SystemClock).unwrap());

    let issue = Issue {
        id: IssueId::new("issue-1"),
        source: IssueSource::GitHub,
        project: "acme/widgets".to_string(),
        number: 1,
        title: "Fix the thing".to_string(),
        body: "repro steps".to_string(),
        labels: vec![],
        url: "https://github.com/acme/widgets/issues/1".to_string(),
        state: IssueState::Open,
        created_at_ms: 0,
        updated_at_ms: 0,
    };
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-1"), JobConfig::new(issue.id.clone(), "acme/widgets", 3)).unwrap();

    let config = PipelineConfig {
        tool_name: "acme-bot".to_string(),
        repo_url: origin.to_str().unwrap().to_string(),
        base_branch: "main".to_string(),
        test_cmd: Some("true".to_string()),
        max_auto_resolvable_conflict_lines: 20,
        auto_pr: false,
        plan_template_override: None,
        provider_name: "acme-cli".to_string(),
        merge_method: apr_adapters::MergeMethod::Squash,
    };
    let runner = Arc::new(PipelineRunner::new(
        store.clone(),
        GitRunner::new(dir.path().join("repos")),
        Arc::new(AlwaysApprove),
        None,
        None,
        dir.path().join("repos"),
        dir.path().join("artifacts"),
        dir.path().join("transcripts"),
        config,
        SystemClock,
        Arc::new(SequentialIdGen::new("t")),
    ));
    let mut runners = ProjectRunners::new();
    runners.insert("acme/widgets".to_string(), runner);

    let ambient = CancellationToken::new();
    let (notifier, notify_rx) = channel(4);
    let handles = spawn(1, store.clone(), Arc::new(runners), notify_rx, ambient.clone());
    notifier.notify();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let state = store.snapshot_state();
        let current = state.get_job(job.id.as_str()).cloned();
        if current.as_ref().map(|j| j.state) == Some(JobState::Ready) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never reached ready");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    ambient.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn unknown_project_fails_the_job_instead_of_looping_forever() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("wal.log"), None, SystemClock).unwrap());

    let issue = Issue {
        id: IssueId::new("issue-2"),
        source: IssueSource::GitHub,
        project: "nope/nope".to_string(),
        number: 1,
        title: "x".to_string(),
        body: "x".to_string(),
        labels: vec![],
        url: "https://github.com/nope/nope/issues/1".to_string(),
        state: IssueState::Open,
        created_at_ms: 0,
        updated_at_ms: 0,
    };
    store.ingest_issue(issue.clone()).unwrap();
    let job = store.create_job(JobId::new("job-2"), JobConfig::new(issue.id.clone(), "nope/nope", 3)).unwrap();

    let ambient = CancellationToken::new();
    let (notifier, notify_rx) = channel(4);
    let handles = spawn(1, store.clone(), Arc::new(ProjectRunners::new()), notify_rx, ambient.clone());
    notifier.notify();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let state = store.snapshot_state();
        let current = state.get_job(job.id.as_str()).cloned();
        if current.as_ref().map(|j| j.state) == Some(JobState::Failed) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never failed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    ambient.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
