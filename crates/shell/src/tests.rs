// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn tokenize_splits_on_whitespace() {
    assert_eq!(tokenize("cargo test --all").unwrap(), vec!["cargo", "test", "--all"]);
}

#[test]
fn tokenize_honours_single_quotes_literally() {
    assert_eq!(tokenize("echo 'a; b|c'").unwrap(), vec!["echo", "a; b|c"]);
}

#[test]
fn tokenize_processes_double_quote_escapes() {
    assert_eq!(tokenize(r#"echo "say \"hi\""#).is_err(), true);
    assert_eq!(tokenize(r#"echo "say \"hi\"""#).unwrap(), vec!["echo", "say \"hi\""]);
}

#[test]
fn tokenize_processes_backslash_escapes_outside_quotes() {
    assert_eq!(tokenize(r"echo a\;b").unwrap(), vec!["echo", "a;b"]);
}

#[test]
fn tokenize_rejects_bare_semicolon() {
    let err = tokenize("cargo test; rm -rf /").unwrap_err();
    assert!(matches!(err, ShellError::DisallowedToken { .. }));
}

#[test]
fn tokenize_rejects_bare_pipe() {
    assert!(tokenize("cargo test | tee out.log").is_err());
}

#[test]
fn tokenize_rejects_bare_double_pipe() {
    assert!(tokenize("cargo test || true").is_err());
}

#[test]
fn tokenize_rejects_command_substitution() {
    assert!(tokenize("echo $(whoami)").is_err());
}

#[test]
fn tokenize_rejects_unterminated_single_quote() {
    assert!(matches!(tokenize("echo 'unterminated").unwrap_err(), ShellError::UnterminatedQuote { .. }));
}

#[test]
fn validate_accepts_an_ordinary_command() {
    assert!(validate_argv(&["cargo".into(), "test".into()]).is_ok());
}

#[test]
fn validate_rejects_bash_directly() {
    let err = validate_argv(&["bash".into(), "-c".into(), "echo hi".into()]).unwrap_err();
    assert!(matches!(err, ShellError::DisallowedExecutable(e) if e == "bash"));
}

#[test]
fn validate_rejects_bash_by_absolute_path() {
    let err = validate_argv(&["/bin/bash".into()]).unwrap_err();
    assert!(matches!(err, ShellError::DisallowedExecutable(e) if e == "bash"));
}

#[test]
fn validate_rejects_sh_smuggled_through_env() {
    let err = validate_argv(&["env".into(), "sh".into(), "-c".into(), "echo hi".into()]).unwrap_err();
    assert!(matches!(err, ShellError::DisallowedExecutable(e) if e == "sh"));
}

#[test]
fn validate_rejects_sh_smuggled_through_env_with_assignments() {
    let err =
        validate_argv(&["env".into(), "FOO=bar".into(), "-i".into(), "zsh".into()]).unwrap_err();
    assert!(matches!(err, ShellError::DisallowedExecutable(e) if e == "zsh"));
}

#[test]
fn validate_rejects_applet_smuggled_through_busybox() {
    let err = validate_argv(&["busybox".into(), "sh".into()]).unwrap_err();
    assert!(matches!(err, ShellError::DisallowedExecutable(e) if e == "sh"));
}

#[test]
fn validate_rejects_empty_argv() {
    assert!(matches!(validate_argv(&[]).unwrap_err(), ShellError::EmptyCommand));
}

#[tokio::test]
async fn run_test_command_reports_a_passing_command() {
    let dir = tempdir().unwrap();
    let out = run_test_command("true", dir.path(), &CancellationToken::new()).await.unwrap();
    assert!(out.passed());
}

#[tokio::test]
async fn run_test_command_reports_a_failing_command() {
    let dir = tempdir().unwrap();
    let out = run_test_command("false", dir.path(), &CancellationToken::new()).await.unwrap();
    assert!(!out.passed());
}

#[tokio::test]
async fn run_test_command_refuses_shell_metacharacters() {
    let dir = tempdir().unwrap();
    let err = run_test_command("true; false", dir.path(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ShellError::DisallowedToken { .. }));
}
