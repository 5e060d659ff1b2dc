// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! apr-storage: the durable event log and materialized read model.
//!
//! [`Wal`] is the append-only fact log. [`state::MaterializedState`] is
//! derived by replaying it. [`Store`] is the façade callers use: durable
//! writes go through it, and it enforces the job state machine's
//! compare-and-set transitions.

pub mod migration;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod wal;

pub use migration::{Migration, MigrationError, MigrationRegistry};
pub use snapshot::{load_snapshot, write_snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
