// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point: resolve the state directory, load config, open the
//! store, build one pipeline runner per configured project, and run the
//! worker pool until a shutdown signal arrives.

use std::sync::Arc;

use apr_adapters::{Forge, ForgeClient, GitCredential, GitRunner, RetryPolicy, SubprocessProvider};
use apr_daemon::config::Config;
use apr_daemon::worker_pool::{self, ProjectRunners};
use apr_daemon::{env, lifecycle, ConfigError, LifecycleError, Paths};
use apr_engine::PipelineConfig;
use apr_engine::PipelineRunner;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state_dir = env::state_dir()?;
    let config_path = env::config_path(&state_dir);
    let config = Config::load(&config_path)?;

    let paths = Paths::under(state_dir);
    let handle = lifecycle::startup(paths)?;
    info!(state_dir = %handle.paths.state_dir.display(), "starting apr-daemon");

    let provider = Arc::new(SubprocessProvider::new(config.provider.binary.clone(), config.provider.args.clone()));
    let provider_name = config
        .provider
        .binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "provider".to_string());
    let mut runners = ProjectRunners::new();
    for project in &config.projects {
        let forge = build_forge(project, &config.tokens);
        let credential = github_credential(project, &config.tokens).or_else(|| gitlab_credential(project, &config.tokens));

        let pipeline_config = PipelineConfig {
            tool_name: "apr".to_string(),
            repo_url: project.repo_url.clone(),
            base_branch: project.base_branch.clone(),
            test_cmd: project.test_cmd.clone(),
            max_auto_resolvable_conflict_lines: project.max_auto_resolvable_conflict_lines,
            auto_pr: config.daemon.auto_pr,
            plan_template_override: project.prompts.plan.clone(),
            provider_name: provider_name.clone(),
            merge_method: apr_adapters::MergeMethod::Squash,
        };

        let runner = PipelineRunner::new(
            handle.store.clone(),
            GitRunner::new(config.daemon.repos_root.clone()),
            provider.clone(),
            forge,
            credential,
            config.daemon.repos_root.clone(),
            handle.paths.artifacts_path.clone(),
            handle.paths.transcripts_path.clone(),
            pipeline_config,
            apr_core::SystemClock,
            Arc::new(apr_core::UuidIdGen),
        );
        runners.insert(project.name.clone(), Arc::new(runner));
    }

    let ambient = CancellationToken::new();
    let (_notifier, notify_rx) = worker_pool::channel(32);
    let workers = worker_pool::spawn(
        config.daemon.max_workers,
        handle.store.clone(),
        Arc::new(runners),
        notify_rx,
        ambient.clone(),
    );

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining workers");
    ambient.cancel();
    for worker in workers {
        if let Err(err) = worker.await {
            error!(%err, "worker task panicked during shutdown");
        }
    }

    handle.shutdown();
    Ok(())
}

fn build_forge(project: &apr_daemon::config::ProjectConfig, tokens: &apr_daemon::config::Tokens) -> Option<(Forge, ForgeClient)> {
    if let Some(github) = &project.github {
        let token = tokens.github_token()?;
        let forge = Forge::github(github.owner.clone(), github.repo.clone(), token);
        return Some((forge, ForgeClient::new(RetryPolicy::default())));
    }
    if let Some(gitlab) = &project.gitlab {
        let token = tokens.gitlab_token()?;
        let forge = Forge::GitLab {
            base_url: gitlab.base_url.clone(),
            project_id: gitlab.project_id.clone(),
            token,
        };
        return Some((forge, ForgeClient::new(RetryPolicy::default())));
    }
    None
}

fn github_credential(project: &apr_daemon::config::ProjectConfig, tokens: &apr_daemon::config::Tokens) -> Option<GitCredential> {
    project.github.as_ref().and_then(|_| tokens.github_token()).map(GitCredential::from_token)
}

fn gitlab_credential(project: &apr_daemon::config::ProjectConfig, tokens: &apr_daemon::config::Tokens) -> Option<GitCredential> {
    project.gitlab.as_ref().and_then(|_| tokens.gitlab_token()).map(GitCredential::from_token)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler, watching ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
