// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session (provider invocation) event handlers.

use apr_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::SessionStarted { session } => {
            state.sessions.entry(session.id.to_string()).or_insert_with(|| session.clone());
        }

        Event::SessionCompleted { session_id, status, response, input_tokens, output_tokens, commit_sha, at_ms } => {
            if let Some(session) = state.sessions.get_mut(session_id.as_str()) {
                if session.ended_at_ms.is_some() {
                    return;
                }
                session.status = *status;
                session.response = response.clone();
                session.input_tokens = *input_tokens;
                session.output_tokens = *output_tokens;
                session.commit_sha = commit_sha.clone();
                session.ended_at_ms = Some(*at_ms);
            }
        }

        _ => {}
    }
}
