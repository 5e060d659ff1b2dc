// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size pool of workers that pull queued jobs off the store and
//! drive them through [`PipelineRunner::run_job`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use apr_core::{JobId, JobState, SystemClock};
use apr_engine::{CancellationWatcher, PipelineRunner};
use apr_storage::Store;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-project runners, keyed by the project string stamped on each job
/// (`JobConfig::new`'s second argument — see `apr_core::JobConfig`).
pub type ProjectRunners = HashMap<String, Arc<PipelineRunner<SystemClock>>>;

/// Hint that a job was just queued. Workers treat this as an opportunistic
/// wake-up only — a closed or lagging channel never stalls the poll loop.
#[derive(Clone)]
pub struct JobNotifier(mpsc::Sender<()>);

impl JobNotifier {
    pub fn notify(&self) {
        let _ = self.0.try_send(());
    }
}

pub fn channel(capacity: usize) -> (JobNotifier, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    (JobNotifier(tx), rx)
}

/// Spawns `count` workers sharing one notification receiver. Each worker
/// loops: wait on a notification, a 5s poll tick, or the ambient
/// cancellation; on wake, try to claim a queued job and run it to
/// completion (or to the next human-handoff state).
pub fn spawn(
    count: usize,
    store: Arc<Store<SystemClock>>,
    runners: Arc<ProjectRunners>,
    notify_rx: mpsc::Receiver<()>,
    ambient: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let notify_rx = Arc::new(tokio::sync::Mutex::new(notify_rx));
    (0..count)
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                store.clone(),
                runners.clone(),
                notify_rx.clone(),
                ambient.clone(),
            ))
        })
        .collect()
}

async fn worker_loop(
    id: usize,
    store: Arc<Store<SystemClock>>,
    runners: Arc<ProjectRunners>,
    notify_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>,
    ambient: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = async { notify_rx.lock().await.recv().await } => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = ambient.cancelled() => {
                info!(worker = id, "worker shutting down");
                return;
            }
        }

        loop {
            let job = match store.claim_next_queued_job() {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(err) => {
                    error!(worker = id, %err, "failed to claim next job");
                    break;
                }
            };

            let Some(runner) = runners.get(&job.project).cloned() else {
                warn!(worker = id, project = %job.project, job = %job.id, "no runner configured for project");
                let _ = store.record_job_error(&job.id, format!("unknown project: {}", job.project));
                let _ = store.transition_job(&job.id, job.state, JobState::Failed);
                continue;
            };

            run_one_job(id, &store, runner, job.id, &ambient).await;

            if ambient.is_cancelled() {
                return;
            }
        }
    }
}

/// Runs one job, isolating a panic inside the pipeline runner so it takes
/// down only this job rather than the whole worker.
async fn run_one_job(
    worker: usize,
    store: &Arc<Store<SystemClock>>,
    runner: Arc<PipelineRunner<SystemClock>>,
    job_id: JobId,
    ambient: &CancellationToken,
) {
    let (job_token, _watcher) = CancellationWatcher::spawn(store.clone(), job_id.clone());
    let forward = {
        let job_token = job_token.clone();
        let ambient = ambient.clone();
        tokio::spawn(async move {
            ambient.cancelled().await;
            job_token.cancel();
        })
    };

    let run = AssertUnwindSafe(runner.run_job(&job_id, &job_token)).catch_unwind();
    let outcome = run.await;
    forward.abort();

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(worker, job = %job_id, %err, "pipeline run returned an error");
        }
        Err(panic) => {
            let message = panic_message(&panic);
            error!(worker, job = %job_id, %message, "worker panic running pipeline");
            let _ = store.record_job_error(&job_id, "worker panic".to_string());
            if let Some(current) = store.snapshot_state().get_job(job_id.as_str()) {
                if !current.state.is_terminal() {
                    let _ = store.transition_job(&job_id, current.state, JobState::Failed);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
