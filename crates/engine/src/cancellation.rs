// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cancellation fabric: every job run derives a scoped
//! [`CancellationToken`] and a background watcher that polls the store
//! every 250 ms for the job entering `cancelled`, firing the token on
//! first observation so every in-flight subprocess, sleep, and store
//! write tears down promptly.

use apr_core::{Clock, JobId, JobState};
use apr_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Whether `job_id` currently reads `cancelled` in the store. Used both
/// by the watcher and by the failure funnel, which reclassifies a
/// step's error as `JobCancelled` rather than routing it to `failJob`
/// when this is true.
pub fn job_is_cancelled<C: Clock>(store: &Store<C>, job_id: &JobId) -> bool {
    store.snapshot_state().get_job(job_id.as_str()).map(|j| j.state == JobState::Cancelled).unwrap_or(false)
}

/// Owns the background polling task for one job run. Aborting the task
/// on drop means a finished or abandoned run never leaks a watcher.
pub struct CancellationWatcher {
    handle: JoinHandle<()>,
}

impl CancellationWatcher {
    /// Spawns the watcher and returns it alongside the token it drives.
    /// The token is also cancelled, and the watcher stops, once the
    /// caller cancels it directly (e.g. on daemon shutdown).
    pub fn spawn<C: Clock + Send + Sync + 'static>(store: Arc<Store<C>>, job_id: JobId) -> (CancellationToken, Self) {
        let token = CancellationToken::new();
        let watcher_token = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                if watcher_token.is_cancelled() {
                    return;
                }
                if job_is_cancelled(&store, &job_id) {
                    watcher_token.cancel();
                    return;
                }
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = watcher_token.cancelled() => return,
                }
            }
        });

        (token, Self { handle })
    }
}

impl Drop for CancellationWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;
