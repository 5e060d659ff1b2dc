// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic compressed snapshots of [`MaterializedState`], so recovery
//! replays only the WAL tail rather than the whole history.

use crate::migration::{MigrationError, MigrationRegistry};
use crate::state::MaterializedState;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;

/// Bumped whenever `MaterializedState`'s shape changes in a way that
/// requires a [`crate::migration::Migration`] to read old snapshots.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compression(String),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Writes `state` to `path` atomically: serialize, compress, write to a
/// sibling temp file, then rename over the destination so a crash never
/// leaves a half-written snapshot.
pub fn write_snapshot(path: impl AsRef<Path>, state: &MaterializedState, seq: u64) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let envelope = serde_json::json!({
        "v": CURRENT_SNAPSHOT_VERSION,
        "seq": seq,
        "state": state,
    });
    let json = serde_json::to_vec(&envelope)?;
    let compressed = zstd::encode_all(json.as_slice(), 3).map_err(|e| SnapshotError::Compression(e.to_string()))?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &compressed)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and migrates a snapshot, returning `None` if the file does not
/// yet exist (the daemon's first run).
pub fn load_snapshot(
    path: impl AsRef<Path>,
    registry: &MigrationRegistry,
) -> Result<Option<(MaterializedState, u64)>, SnapshotError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let compressed = fs::read(path)?;
    let json = zstd::decode_all(compressed.as_slice()).map_err(|e| SnapshotError::Compression(e.to_string()))?;
    let envelope: Value = serde_json::from_slice(&json)?;

    let migrated = registry.migrate_to(envelope, CURRENT_SNAPSHOT_VERSION)?;
    let seq = migrated.get("seq").and_then(Value::as_u64).unwrap_or(0);
    let state: MaterializedState = serde_json::from_value(
        migrated.get("state").cloned().unwrap_or(Value::Null),
    )?;
    Ok(Some((state, seq)))
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
