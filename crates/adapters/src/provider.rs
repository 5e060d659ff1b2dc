// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess adapter for the LLM CLI that drives planning,
//! implementation, review, and conflict resolution.
//!
//! The CLI itself is treated as an opaque, provider-specific binary:
//! this module knows nothing about which vendor it is beyond the argv
//! template and the handful of JSONL message shapes its streamed
//! output may take.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Per-line cap on the provider's stdout stream. Lines longer than this
/// are truncated before being parsed or transcribed.
pub const LINE_CAP_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to spawn provider binary: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("provider exited with status {status}")]
    NonZeroExit { status: i32 },
    #[error("provider run was cancelled")]
    Cancelled,
    #[error("transcript io error: {0}")]
    Transcript(#[source] std::io::Error),
}

/// What a single provider invocation produced.
#[derive(Debug, Clone, Default)]
pub struct ProviderOutput {
    pub response: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration: Duration,
    pub commit_sha: Option<String>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn run(
        &self,
        scope: &CancellationToken,
        workdir: &Path,
        prompt: &str,
        transcript_path: &Path,
    ) -> Result<ProviderOutput, ProviderError>;
}

/// Spawns a configured CLI binary, streaming its stdout as a JSONL
/// transcript and best-effort-extracting assistant text and token
/// counts from it.
///
/// `argv` is the binary's fixed argument list with one sentinel entry,
/// `"{prompt}"`, substituted with the actual prompt at spawn time. This
/// keeps the invocation shape (flags, ordering) entirely up to the
/// caller's configuration rather than hardcoding any one CLI's dialect.
pub struct SubprocessProvider {
    pub binary: PathBuf,
    pub argv: Vec<String>,
}

impl SubprocessProvider {
    pub fn new(binary: impl Into<PathBuf>, argv: Vec<String>) -> Self {
        Self { binary: binary.into(), argv }
    }

    fn build_argv(&self, prompt: &str) -> Vec<String> {
        self.argv.iter().map(|a| if a == "{prompt}" { prompt.to_string() } else { a.clone() }).collect()
    }
}

#[async_trait]
impl Provider for SubprocessProvider {
    async fn run(
        &self,
        scope: &CancellationToken,
        workdir: &Path,
        prompt: &str,
        transcript_path: &Path,
    ) -> Result<ProviderOutput, ProviderError> {
        let started = Instant::now();
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.build_argv(prompt))
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ProviderError::Spawn)?;
        let stdout = child.stdout.take().expect("stdout is piped");
        let mut reader = BufReader::new(stdout);

        let mut transcript = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(transcript_path)
            .await
            .map_err(ProviderError::Transcript)?;

        let mut extraction = Extraction::default();
        let mut line_buf: Vec<u8> = Vec::new();

        loop {
            line_buf.clear();
            let read = tokio::select! {
                r = reader.read_until(b'\n', &mut line_buf) => r,
                () = scope.cancelled() => {
                    return Err(ProviderError::Cancelled);
                }
            };
            let n = read.map_err(ProviderError::Transcript)?;
            if n == 0 {
                break;
            }
            if line_buf.len() > LINE_CAP_BYTES {
                line_buf.truncate(LINE_CAP_BYTES);
            }
            while line_buf.last() == Some(&b'\n') || line_buf.last() == Some(&b'\r') {
                line_buf.pop();
            }
            if line_buf.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(&line_buf);
            transcript.write_all(line.as_bytes()).await.map_err(ProviderError::Transcript)?;
            transcript.write_all(b"\n").await.map_err(ProviderError::Transcript)?;
            extraction.absorb(&line);
        }
        transcript.flush().await.map_err(ProviderError::Transcript)?;
        drop(transcript);

        let status = tokio::select! {
            s = child.wait() => s.map_err(ProviderError::Spawn)?,
            () = scope.cancelled() => return Err(ProviderError::Cancelled),
        };

        if !status.success() {
            return Err(ProviderError::NonZeroExit { status: status.code().unwrap_or(-1) });
        }

        let commit_sha = read_head_sha(workdir, scope).await;

        Ok(ProviderOutput {
            response: extraction.response,
            input_tokens: extraction.input_tokens,
            output_tokens: extraction.output_tokens,
            duration: started.elapsed(),
            commit_sha,
        })
    }
}

/// Best-effort reads `HEAD` after a clean provider exit. Failure here
/// is not fatal: the caller falls back to the git runner's own commit
/// sha once it stages and commits the worktree.
async fn read_head_sha(workdir: &Path, cancel: &CancellationToken) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(["rev-parse", "HEAD"]).current_dir(workdir);
    match crate::subprocess::run_cancellable(cmd, Duration::from_secs(10), cancel, "rev-parse HEAD").await {
        Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
        _ => None,
    }
}

#[derive(Default)]
struct Extraction {
    response: String,
    input_tokens: u64,
    output_tokens: u64,
}

impl Extraction {
    /// Parses one transcript line against the accepted message shapes,
    /// updating `response` / token counters as they appear. Lines that
    /// don't parse, or don't match a known shape, are silently ignored
    /// — they still made it into the transcript file verbatim.
    fn absorb(&mut self, line: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            return;
        };

        let msg_type = value.get("type").and_then(|v| v.as_str()).unwrap_or_default();

        match msg_type {
            "assistant" => {
                if let Some(blocks) = value.pointer("/message/content").and_then(|v| v.as_array()) {
                    let mut text = String::new();
                    for block in blocks {
                        if block.get("type").and_then(|v| v.as_str()) == Some("text") {
                            if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                                text.push_str(t);
                            }
                        }
                    }
                    if !text.is_empty() {
                        self.response = text;
                    }
                }
                if let Some(usage) = value.pointer("/message/usage") {
                    self.accumulate_usage(usage);
                }
            }
            "result" => {
                if let Some(result) = value.get("result").and_then(|v| v.as_str()) {
                    self.response = result.to_string();
                }
            }
            "item.completed" => {
                if value.pointer("/item/type").and_then(|v| v.as_str()) == Some("agent_message") {
                    if let Some(text) = value.pointer("/item/text").and_then(|v| v.as_str()) {
                        self.response = text.to_string();
                    }
                }
            }
            "turn.completed" => {
                if let Some(usage) = value.get("usage") {
                    self.accumulate_usage(usage);
                }
            }
            _ => {}
        }
    }

    fn accumulate_usage(&mut self, usage: &serde_json::Value) {
        if let Some(n) = usage.get("input_tokens").and_then(|v| v.as_u64()) {
            self.input_tokens += n;
        }
        if let Some(n) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
            self.output_tokens += n;
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
