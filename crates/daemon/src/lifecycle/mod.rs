// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, shutdown, and the on-disk layout they agree on.
//!
//! Crash recovery (snapshot load + WAL replay) lives in
//! [`apr_storage::Store::open`], not here — the daemon's own job is
//! acquiring the lock, laying out directories, and opening that store.

mod startup;

pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use apr_core::SystemClock;
use apr_storage::Store;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory")]
    NoStateDir,
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] apr_storage::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths the daemon agrees on under a single state directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub repos_path: PathBuf,
    pub artifacts_path: PathBuf,
    pub transcripts_path: PathBuf,
}

impl Paths {
    pub fn under(state_dir: PathBuf) -> Self {
        Self {
            lock_path: state_dir.join("daemon.pid"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.bin"),
            repos_path: state_dir.join("repos"),
            artifacts_path: state_dir.join("artifacts"),
            transcripts_path: state_dir.join("transcripts"),
            state_dir,
        }
    }
}

/// A started daemon: the lock it holds and the store it opened.
pub struct DaemonHandle {
    pub paths: Paths,
    pub store: Arc<Store<SystemClock>>,
    lock_file: File,
}

impl DaemonHandle {
    pub(crate) fn new(paths: Paths, store: Arc<Store<SystemClock>>, lock_file: File) -> Self {
        Self { paths, store, lock_file }
    }

    /// Writes a final sync snapshot so the next startup replays as little
    /// of the WAL as possible, then releases the lock.
    pub fn shutdown(self) {
        if let Err(err) = self.store.compact() {
            tracing::warn!(%err, "final snapshot on shutdown failed");
        }
        let _ = std::fs::remove_file(&self.paths.lock_path);
        drop(self.lock_file);
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
