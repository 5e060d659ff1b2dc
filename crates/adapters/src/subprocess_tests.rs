// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::process::Command;

#[tokio::test]
async fn run_with_timeout_captures_stdout() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn run_with_timeout_reports_nonzero_exit_in_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "exit 3"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh").await.unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[tokio::test]
async fn run_with_timeout_times_out_a_sleeping_command() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep").await.unwrap_err();
    assert!(matches!(err, SubprocessError::Timeout(..)));
}

#[tokio::test]
async fn run_cancellable_is_interrupted_by_the_token() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let token = CancellationToken::new();
    let token_clone = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token_clone.cancel();
    });
    let err = run_cancellable(cmd, Duration::from_secs(5), &token, "sleep").await.unwrap_err();
    assert!(matches!(err, SubprocessError::Cancelled(..)));
}

#[test]
fn truncate_captured_leaves_small_output_untouched() {
    let bytes = b"small output";
    assert_eq!(truncate_captured(bytes), bytes.to_vec());
}

#[test]
fn truncate_captured_caps_large_output() {
    let bytes = vec![b'x'; MAX_CAPTURED_BYTES + 500];
    let out = truncate_captured(&bytes);
    assert!(out.len() < bytes.len());
    assert!(out.ends_with(b"... (truncated)"));
}
