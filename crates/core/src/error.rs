// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for domain-level invariant violations.
//!
//! Crates downstream of `apr-core` (storage, engine, daemon) define their
//! own error types for I/O and subprocess failures; this enum only covers
//! violations of the domain invariants defined here.

use crate::job::JobState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("illegal job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("job {job_id} has reached its iteration cap of {max_iterations}")]
    IterationCapExceeded { job_id: String, max_iterations: u32 },

    #[error("malformed conflict markers: {0}")]
    MalformedConflictMarkers(String),

    #[error("validation failed: {0}")]
    Validation(String),
}
