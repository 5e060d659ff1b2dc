// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: acquire the lock, lay out directories, open the store.

use std::io::Write;
use std::sync::Arc;

use apr_core::SystemClock;
use apr_storage::Store;
use fs2::FileExt;
use tracing::info;

use super::{DaemonHandle, LifecycleError, Paths};

/// Starts the daemon: acquires the PID lock, creates directories, and opens
/// the store (which owns crash recovery via snapshot load + WAL replay).
pub fn startup(paths: Paths) -> Result<DaemonHandle, LifecycleError> {
    match startup_inner(&paths) {
        Ok(handle) => Ok(handle),
        Err(err) => {
            // Don't clean up on a lock failure — those files belong to the
            // already-running daemon.
            if !matches!(err, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&paths);
            }
            Err(err)
        }
    }
}

fn startup_inner(paths: &Paths) -> Result<DaemonHandle, LifecycleError> {
    std::fs::create_dir_all(&paths.state_dir)?;
    std::fs::create_dir_all(&paths.repos_path)?;
    std::fs::create_dir_all(&paths.artifacts_path)?;
    std::fs::create_dir_all(&paths.transcripts_path)?;
    if let Some(parent) = paths.wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Open without truncating so we don't wipe a running daemon's PID
    // before the lock is confirmed held.
    let lock_file =
        std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let store = Arc::new(Store::open(paths.wal_path.clone(), Some(paths.snapshot_path.clone()), SystemClock)?);
    let state = store.snapshot_state();
    info!(jobs = state.jobs.len(), queued = state.queued_jobs().len(), "daemon started");

    Ok(DaemonHandle::new(paths.clone(), store, lock_file))
}

fn cleanup_on_failure(paths: &Paths) {
    if paths.lock_path.exists() {
        let _ = std::fs::remove_file(&paths.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
