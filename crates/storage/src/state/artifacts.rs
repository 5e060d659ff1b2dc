// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact recording event handler.

use apr_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    if let Event::ArtifactRecorded { artifact } = event {
        state.artifacts.entry(artifact.id.to_string()).or_insert_with(|| artifact.clone());
    }
}
