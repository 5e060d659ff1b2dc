// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs a validated test command argv directly, with no shell in
//! between, capturing combined stdout/stderr up to a size cap.

use crate::{tokenizer, validate, ShellError};
use apr_adapters::subprocess::{self, truncate_captured, TEST_COMMAND_TIMEOUT};
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TestOutput {
    pub exit_code: i32,
    pub combined_output: Vec<u8>,
}

impl TestOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Tokenizes, validates, and runs `command` in `cwd`. Stdout and
/// stderr are merged in process-output order as best as
/// `std::process::Output` allows (they're captured as separate pipes
/// and concatenated, stdout first) and capped at 100 KiB combined.
pub async fn run_test_command(
    command: &str,
    cwd: &Path,
    cancel: &CancellationToken,
) -> Result<TestOutput, ShellError> {
    let argv = tokenizer::tokenize(command)?;
    validate::validate_argv(&argv)?;

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]).current_dir(cwd);

    let output = subprocess::run_cancellable(cmd, TEST_COMMAND_TIMEOUT, cancel, "test command")
        .await
        .map_err(ShellError::Subprocess)?;

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    Ok(TestOutput { exit_code: output.status.code().unwrap_or(-1), combined_output: truncate_captured(&combined) })
}
