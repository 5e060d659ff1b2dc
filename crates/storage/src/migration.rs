// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot schema migrations, applied on load when a snapshot's stored
//! version is older than the store's current version.

use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot version {0} is newer than the highest supported version {1}")]
    TooNew(u32, u32),
    #[error("no migration path from version {0} to {1}")]
    NoPath(u32, u32),
}

/// A single version-to-version snapshot transform.
pub trait Migration: Send + Sync {
    fn source_version(&self) -> u32;
    fn target_version(&self) -> u32;
    fn migrate(&self, snapshot: &mut Value) -> Result<(), MigrationError>;
}

/// Ordered collection of migrations, applied as a chain.
#[derive(Default)]
pub struct MigrationRegistry {
    pub(crate) migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: Vec::new() }
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) {
        self.migrations.push(migration);
    }

    /// Migrates `snapshot` (expected to carry a top-level `"v"` field) up
    /// to `target_version`, applying registered migrations in sequence.
    pub fn migrate_to(&self, mut snapshot: Value, target_version: u32) -> Result<Value, MigrationError> {
        let mut current = snapshot
            .get("v")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(0);

        if current > target_version {
            return Err(MigrationError::TooNew(current, target_version));
        }

        while current < target_version {
            let next = self.migrations.iter().find(|m| m.source_version() == current);
            let Some(migration) = next else {
                return Err(MigrationError::NoPath(current, target_version));
            };
            migration.migrate(&mut snapshot)?;
            current = migration.target_version();
            if let Some(obj) = snapshot.as_object_mut() {
                obj.insert("v".to_string(), Value::from(current));
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
