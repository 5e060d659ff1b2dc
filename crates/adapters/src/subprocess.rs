// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a timeout and a cooperative cancellation
//! token. Output is always captured (never inherited) so callers can
//! redact it before it reaches a log or the TUI.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

pub const GIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(300);
pub const TEST_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Caps how much combined stdout+stderr a captured command keeps.
pub const MAX_CAPTURED_BYTES: usize = 100 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("{label} failed to spawn: {0}")]
    Spawn(String, #[source] std::io::Error),
    #[error("{label} timed out after {0:?}")]
    Timeout(String, Duration),
    #[error("{label} was cancelled")]
    Cancelled(String),
}

/// Runs `cmd` to completion, killing it if `timeout` elapses first.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| SubprocessError::Spawn(label.to_string(), e))?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(SubprocessError::Spawn(label.to_string(), e)),
        Err(_elapsed) => Err(SubprocessError::Timeout(label.to_string(), timeout)),
    }
}

/// Like [`run_with_timeout`], but also races the command against a
/// [`CancellationToken`] so a job's cancellation watcher can tear down a
/// long-running `git`/test/provider subprocess promptly.
pub async fn run_cancellable(
    mut cmd: Command,
    timeout: Duration,
    cancel: &CancellationToken,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| SubprocessError::Spawn(label.to_string(), e))?;

    // `child.wait_with_output()` consumes the child immediately to build
    // the future below; if the cancellation branch wins, that future
    // (and the child handle inside it) is dropped, and `kill_on_drop`
    // above is what actually tears down the OS process.
    tokio::select! {
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SubprocessError::Spawn(label.to_string(), e)),
            Err(_elapsed) => Err(SubprocessError::Timeout(label.to_string(), timeout)),
        },
        () = cancel.cancelled() => {
            Err(SubprocessError::Cancelled(label.to_string()))
        }
    }
}

/// Truncates `bytes` to [`MAX_CAPTURED_BYTES`], appending a marker if it
/// was cut.
pub fn truncate_captured(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() <= MAX_CAPTURED_BYTES {
        return bytes.to_vec();
    }
    let mut out = bytes[..MAX_CAPTURED_BYTES].to_vec();
    out.extend_from_slice(b"\n... (truncated)");
    out
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
