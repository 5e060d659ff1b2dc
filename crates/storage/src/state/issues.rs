// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue ingestion event handlers.

use apr_core::{Event, IssueState};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::IssueIngested { issue } => {
            state.issues.entry(issue.id.to_string()).or_insert_with(|| issue.clone());
        }

        Event::IssueClosed { issue_id, at_ms } => {
            if let Some(issue) = state.issues.get_mut(issue_id.as_str()) {
                issue.state = IssueState::Closed;
                issue.updated_at_ms = *at_ms;
            }
        }

        _ => {}
    }
}
