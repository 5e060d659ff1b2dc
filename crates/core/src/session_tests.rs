// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_session_starts_running_with_no_end_time() {
    let session = Session::new(
        SessionId::new("s-1"),
        JobId::new("job-1"),
        StepKind::Plan,
        0,
        "acme-cli",
        "do the thing",
        PathBuf::from("/tmp/s-1.jsonl"),
        1_000,
    );
    assert_eq!(session.status, SessionStatus::Running);
    assert!(session.response.is_none());
    assert!(session.ended_at_ms.is_none());
    assert!(session.duration_ms().is_none());
}

#[test]
fn duration_is_difference_between_start_and_end() {
    let mut session = SessionBuilder::default().started_at_ms(1_000).build();
    session.ended_at_ms = Some(4_500);
    assert_eq!(session.duration_ms(), Some(3_500));
}

#[test]
fn running_is_the_only_non_terminal_status() {
    assert!(!SessionStatus::Running.is_terminal());
    assert!(SessionStatus::Succeeded.is_terminal());
    assert!(SessionStatus::Failed.is_terminal());
    assert!(SessionStatus::Cancelled.is_terminal());
}
