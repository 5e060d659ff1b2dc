// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wraps the `git` CLI as a subprocess, rather than a library such as
//! `git2`/libgit2: the CLI's working-tree safety checks (it refuses to
//! clobber uncommitted changes on checkout/rebase unless forced) and its
//! native sparse-checkout support are both load-bearing here, and are
//! easy to lose by reimplementing them over libgit2's lower-level API.
//!
//! Every captured byte of output is redacted before it is ever turned
//! into an error message or artifact; no credential reaches a caller.

use crate::credential::{AskpassScript, GitCredential, PASSWORD_ENV, USERNAME_ENV};
use crate::safe_path::{resolve_no_symlink_path, SafePathError};
use crate::subprocess::{self, SubprocessError};
use apr_core::{redact, RedactionSecrets};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("git command timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("nothing to commit")]
    NothingToCommit,
    #[error("rebase produced conflicts")]
    RebaseConflicts,
    #[error(transparent)]
    UnsafePath(#[from] SafePathError),
    #[error("malformed remote url: {0}")]
    MalformedUrl(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GitError {
    fn from_subprocess(err: SubprocessError) -> Self {
        match err {
            SubprocessError::Timeout(..) => GitError::Timeout,
            SubprocessError::Cancelled(..) => GitError::Cancelled,
            SubprocessError::Spawn(_, e) => GitError::CommandFailed(e.to_string()),
        }
    }
}

const CONFLICT_TOKENS: &[&str] =
    &["CONFLICT", "fix conflicts and then run", "Could not apply", "need to resolve your current index first"];

/// Outcome of rebasing a job's branch onto its base.
#[derive(Debug)]
pub enum RebaseOutcome {
    /// Rebase completed and the branch tip didn't move (already current).
    NoOp,
    /// Rebase completed cleanly with movement.
    Clean { before_sha: String, after_sha: String },
    /// Rebase stopped with conflicts; caller should enumerate
    /// [`GitRunner::conflicted_files`] next.
    Conflicts,
}

/// Invokes `git` rooted under `repos_root`, the directory that houses
/// every job's worktree.
pub struct GitRunner {
    repos_root: PathBuf,
}

impl GitRunner {
    pub fn new(repos_root: impl Into<PathBuf>) -> Self {
        Self { repos_root: repos_root.into() }
    }

    /// `git clone --branch <base> <authenticated-url> <dest>`, where
    /// `dest` is resolved under the safety root and must not already
    /// exist. Immediately rewrites the origin URL to strip the embedded
    /// credential once the clone completes.
    pub async fn clone_for_job(
        &self,
        repo_url: &str,
        base_branch: &str,
        job_id: &str,
        credential: Option<&GitCredential>,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<PathBuf, GitError> {
        let dest = self.repos_root.join("worktrees").join(job_id);
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let clone_url = match credential {
            Some(cred) => authenticated_url(repo_url, cred)?,
            None => repo_url.to_string(),
        };
        let dest_str = dest.display().to_string();
        let args = vec!["clone", "--branch", base_branch, clone_url.as_str(), dest_str.as_str()];
        self.run(&self.repos_root, &args, cancel, "git clone", secrets).await?;

        let sanitized = strip_user_info(repo_url)?;
        self.run(&dest, &["remote", "set-url", "origin", sanitized.as_str()], cancel, "git remote set-url", secrets)
            .await?;

        resolve_no_symlink_path(&self.repos_root, &dest).map_err(GitError::from)
    }

    pub async fn checkout_new_branch(
        &self,
        worktree: &Path,
        branch: &str,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<(), GitError> {
        self.run(worktree, &["checkout", "-b", branch], cancel, "git checkout -b", secrets).await?;
        Ok(())
    }

    /// `git push origin <branch>`, authenticated via a per-invocation
    /// askpass script. Returns the redacted combined output.
    pub async fn push(
        &self,
        worktree: &Path,
        credential: &GitCredential,
        branch: &str,
        force_with_lease: bool,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<String, GitError> {
        let mut args = vec!["push", "origin", branch];
        if force_with_lease {
            args.insert(1, "--force-with-lease");
        }
        self.run_with_credential(worktree, &args, credential, cancel, "git push", secrets).await
    }

    pub async fn delete_remote_branch(
        &self,
        worktree: &Path,
        credential: &GitCredential,
        branch: &str,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<(), GitError> {
        self.run_with_credential(worktree, &["push", "origin", "--delete", branch], credential, cancel, "git push --delete", secrets)
            .await?;
        Ok(())
    }

    /// `git add -N .` (so untracked files show up) then `git diff
    /// --name-only origin/<base>`.
    pub async fn diff_name_only(
        &self,
        worktree: &Path,
        base_branch: &str,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<Vec<String>, GitError> {
        self.run(worktree, &["add", "-N", "."], cancel, "git add -N", secrets).await?;
        let remote = format!("origin/{base_branch}");
        let out = self.run(worktree, &["diff", "--name-only", remote.as_str()], cancel, "git diff --name-only", secrets).await?;
        Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    /// `git add -A`, then commit if there are staged changes.
    /// `GitError::NothingToCommit` when the index matches HEAD.
    pub async fn commit_all(
        &self,
        worktree: &Path,
        message: &str,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<String, GitError> {
        self.run(worktree, &["add", "-A"], cancel, "git add -A", secrets).await?;
        if !self.has_staged_changes(worktree, cancel, secrets).await? {
            return Err(GitError::NothingToCommit);
        }
        self.run(worktree, &["commit", "-m", message], cancel, "git commit", secrets).await?;
        let sha = self.run(worktree, &["rev-parse", "HEAD"], cancel, "git rev-parse HEAD", secrets).await?;
        Ok(sha.trim().to_string())
    }

    async fn has_staged_changes(
        &self,
        worktree: &Path,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<bool, GitError> {
        match self.run(worktree, &["diff", "--cached", "--quiet"], cancel, "git diff --cached --quiet", secrets).await {
            Ok(_) => Ok(false),
            Err(GitError::CommandFailed(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Best-effort `HEAD` sha, used when a provider-driven commit needs a
    /// fallback sha to record.
    pub async fn head_sha(&self, worktree: &Path, cancel: &CancellationToken, secrets: &RedactionSecrets) -> Option<String> {
        self.run(worktree, &["rev-parse", "HEAD"], cancel, "git rev-parse HEAD", secrets)
            .await
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Configures `diff3` conflict markers, fetches the base, and rebases
    /// onto it.
    pub async fn rebase_onto_base(
        &self,
        worktree: &Path,
        base_branch: &str,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<RebaseOutcome, GitError> {
        self.run(worktree, &["config", "merge.conflictStyle", "diff3"], cancel, "git config", secrets).await?;
        self.run(worktree, &["fetch", "origin", base_branch], cancel, "git fetch", secrets).await?;

        let before_sha = self
            .run(worktree, &["rev-parse", "HEAD"], cancel, "git rev-parse HEAD", secrets)
            .await?
            .trim()
            .to_string();

        let remote = format!("origin/{base_branch}");
        match self.run(worktree, &["rebase", remote.as_str()], cancel, "git rebase", secrets).await {
            Ok(output) => {
                if CONFLICT_TOKENS.iter().any(|t| output.contains(t)) {
                    return Ok(RebaseOutcome::Conflicts);
                }
                let after_sha = self
                    .run(worktree, &["rev-parse", "HEAD"], cancel, "git rev-parse HEAD", secrets)
                    .await?
                    .trim()
                    .to_string();
                if after_sha == before_sha {
                    Ok(RebaseOutcome::NoOp)
                } else {
                    Ok(RebaseOutcome::Clean { before_sha, after_sha })
                }
            }
            Err(GitError::CommandFailed(msg)) if CONFLICT_TOKENS.iter().any(|t| msg.contains(t)) => {
                Ok(RebaseOutcome::Conflicts)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn rebase_continue(&self, worktree: &Path, cancel: &CancellationToken, secrets: &RedactionSecrets) -> Result<(), GitError> {
        self.run(worktree, &["rebase", "--continue"], cancel, "git rebase --continue", secrets).await?;
        Ok(())
    }

    pub async fn rebase_abort(&self, worktree: &Path, cancel: &CancellationToken, secrets: &RedactionSecrets) -> Result<(), GitError> {
        self.run(worktree, &["rebase", "--abort"], cancel, "git rebase --abort", secrets).await?;
        Ok(())
    }

    /// Removes `.git/rebase-merge` and `.git/rebase-apply`, refusing if
    /// either is a symlink (which would make the removal escape the
    /// worktree).
    pub async fn cleanup_rebase_state(&self, worktree: &Path) -> Result<(), GitError> {
        for name in ["rebase-merge", "rebase-apply"] {
            let path = worktree.join(".git").join(name);
            match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(SafePathError::SymlinkComponent.into());
                }
                Ok(_) => {
                    tokio::fs::remove_dir_all(&path).await?;
                }
                Err(_) => {}
            }
        }
        Ok(())
    }

    /// Files with unresolved conflicts, via `--diff-filter=U`.
    pub async fn conflicted_files(
        &self,
        worktree: &Path,
        cancel: &CancellationToken,
        secrets: &RedactionSecrets,
    ) -> Result<Vec<String>, GitError> {
        let out = self
            .run(worktree, &["diff", "--name-only", "--diff-filter=U"], cancel, "git diff --diff-filter=U", secrets)
            .await?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    async fn run(
        &self,
        cwd: &Path,
        args: &[&str],
        cancel: &CancellationToken,
        label: &str,
        secrets: &RedactionSecrets,
    ) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(cwd).env("GIT_TERMINAL_PROMPT", "0").env("GIT_EDITOR", "true");
        self.execute(cmd, cancel, label, secrets).await
    }

    async fn run_with_credential(
        &self,
        cwd: &Path,
        args: &[&str],
        credential: &GitCredential,
        cancel: &CancellationToken,
        label: &str,
        secrets: &RedactionSecrets,
    ) -> Result<String, GitError> {
        let askpass = AskpassScript::write(cwd)?;
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .env("GIT_ASKPASS", askpass.path())
            .env(USERNAME_ENV, &credential.username)
            .env(PASSWORD_ENV, &credential.password);
        self.execute(cmd, cancel, label, secrets).await
    }

    async fn execute(
        &self,
        cmd: Command,
        cancel: &CancellationToken,
        label: &str,
        secrets: &RedactionSecrets,
    ) -> Result<String, GitError> {
        let output = subprocess::run_cancellable(cmd, subprocess::GIT_TIMEOUT, cancel, label)
            .await
            .map_err(GitError::from_subprocess)?;
        let stdout = redact(&String::from_utf8_lossy(&output.stdout), secrets);
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = redact(&String::from_utf8_lossy(&output.stderr), secrets);
            Err(GitError::CommandFailed(if stderr.trim().is_empty() { stdout } else { stderr }))
        }
    }
}

/// Embeds `credential` as URL user-info for a one-shot `git clone`.
fn authenticated_url(repo_url: &str, credential: &GitCredential) -> Result<String, GitError> {
    let mut url = Url::parse(repo_url)?;
    let _ = url.set_username(&credential.username);
    let _ = url.set_password(Some(&credential.password));
    Ok(url.into())
}

fn strip_user_info(repo_url: &str) -> Result<String, GitError> {
    let mut url = Url::parse(repo_url)?;
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Ok(url.into())
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
