// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! apr-shell: a narrow, shell-free tokenizer and validator for the
//! project's configured test command.
//!
//! This is deliberately not a shell implementation. It parses just
//! enough quoting to build an argv, refuses anything that implies
//! shell semantics (pipes, redirects, substitution, chaining), and
//! refuses to launch an interactive shell even indirectly via `env`
//! or `busybox`. The resulting argv is executed directly.

mod exec;
mod tokenizer;
mod validate;

pub use exec::{run_test_command, TestOutput};
pub use tokenizer::tokenize;
pub use validate::validate_argv;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("unterminated quote starting at byte {pos}")]
    UnterminatedQuote { pos: usize },
    #[error("trailing backslash at byte {pos}")]
    TrailingBackslash { pos: usize },
    #[error("disallowed token '{token}' at byte {pos}: test commands run without a shell")]
    DisallowedToken { token: String, pos: usize },
    #[error("test command is empty")]
    EmptyCommand,
    #[error("disallowed executable: {0}")]
    DisallowedExecutable(String),
    #[error(transparent)]
    Subprocess(#[from] apr_adapters::subprocess::SubprocessError),
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
