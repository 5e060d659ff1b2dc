// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared proptest strategies for domain types, reused by this crate's
//! own property tests and by downstream crates via the `test-support`
//! feature.

use crate::job::JobState;
use proptest::prelude::*;

/// Every `JobState` variant, for exhaustive or sampled property tests.
pub fn any_job_state() -> impl Strategy<Value = JobState> {
    prop_oneof![
        Just(JobState::Queued),
        Just(JobState::Planning),
        Just(JobState::Implementing),
        Just(JobState::Reviewing),
        Just(JobState::Testing),
        Just(JobState::Rebasing),
        Just(JobState::ResolvingConflicts),
        Just(JobState::Ready),
        Just(JobState::AwaitingChecks),
        Just(JobState::Approved),
        Just(JobState::Merged),
        Just(JobState::PrClosed),
        Just(JobState::Rejected),
        Just(JobState::Failed),
        Just(JobState::Cancelled),
    ]
}

/// A plausible epoch-millisecond timestamp, strictly increasing relative
/// to `base` by up to an hour — useful for generating `created_at_ms` /
/// `updated_at_ms` pairs that respect ordering invariants.
pub fn epoch_ms_after(base: u64) -> impl Strategy<Value = u64> {
    (0u64..3_600_000).prop_map(move |delta| base + delta)
}
