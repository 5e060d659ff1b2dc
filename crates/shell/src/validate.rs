// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rejects argvs that would hand control to an interactive shell,
//! directly or smuggled through `env`/`busybox`.

use crate::ShellError;
use std::path::Path;

const DISALLOWED_EXECUTABLES: [&str; 11] =
    ["sh", "bash", "zsh", "dash", "ksh", "csh", "tcsh", "fish", "cmd", "powershell", "pwsh"];

const SMUGGLING_WRAPPERS: [&str; 2] = ["env", "busybox"];

pub fn validate_argv(argv: &[String]) -> Result<(), ShellError> {
    if argv.is_empty() {
        return Err(ShellError::EmptyCommand);
    }

    let mut idx = 0;
    loop {
        let exe = basename(&argv[idx]);
        if DISALLOWED_EXECUTABLES.contains(&exe.as_str()) {
            return Err(ShellError::DisallowedExecutable(exe));
        }
        if !SMUGGLING_WRAPPERS.contains(&exe.as_str()) {
            return Ok(());
        }
        match next_program_index(argv, idx + 1, &exe) {
            Some(next_idx) => idx = next_idx,
            None => return Ok(()),
        }
    }
}

/// Given `wrapper` at `argv[idx - 1]`, finds the index of the program
/// it would actually invoke, skipping flags and `VAR=value`
/// assignments that `env` accepts before its target command.
fn next_program_index(argv: &[String], mut idx: usize, wrapper: &str) -> Option<usize> {
    if wrapper == "env" {
        while idx < argv.len() {
            let tok = &argv[idx];
            if tok == "--" {
                idx += 1;
                break;
            }
            if tok.starts_with('-') || tok.contains('=') {
                idx += 1;
                continue;
            }
            break;
        }
    }
    // busybox's own argv[0] doubles as its applet dispatcher when
    // invoked as `busybox <applet> ...`; the applet is argv[idx].
    if idx < argv.len() {
        Some(idx)
    } else {
        None
    }
}

fn basename(arg: &str) -> String {
    Path::new(arg).file_name().and_then(|n| n.to_str()).unwrap_or(arg).to_string()
}
