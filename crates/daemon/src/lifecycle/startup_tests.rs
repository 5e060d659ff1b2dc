// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn startup_creates_the_directory_layout_and_opens_a_store() {
    let dir = tempdir().unwrap();
    let paths = Paths::under(dir.path().to_path_buf());

    let handle = startup(paths.clone()).unwrap();

    assert!(paths.repos_path.is_dir());
    assert!(paths.artifacts_path.is_dir());
    assert!(paths.transcripts_path.is_dir());
    assert!(paths.wal_path.parent().unwrap().is_dir());
    assert_eq!(handle.store.snapshot_state().jobs.len(), 0);
    handle.shutdown();
}

#[test]
fn a_second_startup_against_the_same_state_dir_fails_to_acquire_the_lock() {
    let dir = tempdir().unwrap();
    let paths = Paths::under(dir.path().to_path_buf());

    let first = startup(paths.clone()).unwrap();
    let second = startup(paths.clone());

    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
    // The first instance's lock file must survive the second's failed attempt.
    assert!(paths.lock_path.exists());
    first.shutdown();
}
