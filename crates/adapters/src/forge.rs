// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level client for GitHub's REST v3 and GitLab's v4 pull/merge
//! request APIs, with the retry and soft-conflict handling both forges
//! need around `CreatePR`.

use crate::retry::{parse_retry_after, RetryPolicy};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const ERROR_BODY_CAP: usize = 4 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("could not locate a PR/MR number in url: {0}")]
    UnrecognizedUrl(String),
}

/// Identifies a forge project and the credential to act on it with.
#[derive(Debug, Clone)]
pub enum Forge {
    GitHub { api_base: String, owner: String, repo: String, token: String },
    GitLab { base_url: String, project_id: String, token: String },
}

impl Forge {
    /// A GitHub.com project, using the standard REST API host.
    pub fn github(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Self {
        Forge::GitHub {
            api_base: "https://api.github.com".to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

#[derive(Debug, Clone)]
pub struct PrStatus {
    pub merged: bool,
    pub merged_at: Option<String>,
    pub closed: bool,
    pub closed_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CheckRunSummary {
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
    pub first_failed: Option<(String, String)>,
}

impl CheckRunSummary {
    /// Total check runs observed, of any conclusion. Zero means the
    /// forge reports no check runs at all for that ref (e.g. no CI
    /// configured, or GitLab which this is never populated for).
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.pending
    }
}

pub struct ForgeClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ForgeClient {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { http: reqwest::Client::new(), retry }
    }

    /// Creates a PR/MR for `head_branch` against `base_branch`. If the
    /// forge reports a soft conflict (GitHub 422 / GitLab 409) because
    /// one already exists, silently returns the existing one's URL
    /// instead of propagating the error.
    pub async fn create_or_find_pr(
        &self,
        forge: &Forge,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ForgeError> {
        let conflict_status = match forge {
            Forge::GitHub { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Forge::GitLab { .. } => StatusCode::CONFLICT,
        };

        match self.create_pr(forge, head_branch, base_branch, title, body, cancel).await {
            Ok(url) => Ok(url),
            Err(ForgeError::Http { status, .. }) if status == conflict_status.as_u16() => {
                self.find_pr_by_branch(forge, head_branch, cancel)
                    .await?
                    .ok_or_else(|| ForgeError::Http { status, body: "no existing PR/MR found".into() })
            }
            Err(e) => Err(e),
        }
    }

    async fn create_pr(
        &self,
        forge: &Forge,
        head_branch: &str,
        base_branch: &str,
        title: &str,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ForgeError> {
        match forge {
            Forge::GitHub { api_base, owner, repo, token } => {
                let url = format!("{api_base}/repos/{owner}/{repo}/pulls");
                #[derive(serde::Serialize)]
                struct Req<'a> {
                    title: &'a str,
                    body: &'a str,
                    head: &'a str,
                    base: &'a str,
                }
                let req = Req { title, body, head: head_branch, base: base_branch };
                let resp = self
                    .execute_with_retry(cancel, || {
                        self.http.request(Method::POST, &url).bearer_auth(token).json(&req).build().unwrap()
                    })
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    html_url: String,
                }
                let parsed: Resp = resp.json().await?;
                Ok(parsed.html_url)
            }
            Forge::GitLab { base_url, project_id, token } => {
                let url = format!("{base_url}/api/v4/projects/{}/merge_requests", percent_encode_project(project_id));
                #[derive(serde::Serialize)]
                struct Req<'a> {
                    title: &'a str,
                    description: &'a str,
                    source_branch: &'a str,
                    target_branch: &'a str,
                }
                let req = Req { title, description: body, source_branch: head_branch, target_branch: base_branch };
                let resp = self
                    .execute_with_retry(cancel, || {
                        self.http.request(Method::POST, &url).header("PRIVATE-TOKEN", token).json(&req).build().unwrap()
                    })
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    web_url: String,
                }
                let parsed: Resp = resp.json().await?;
                Ok(parsed.web_url)
            }
        }
    }

    async fn find_pr_by_branch(
        &self,
        forge: &Forge,
        head_branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ForgeError> {
        match forge {
            Forge::GitHub { api_base, owner, repo, token } => {
                let url = format!(
                    "{api_base}/repos/{owner}/{repo}/pulls?head={owner}:{head_branch}&state=all"
                );
                let resp = self
                    .execute_with_retry(cancel, || self.http.request(Method::GET, &url).bearer_auth(token).build().unwrap())
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    html_url: String,
                }
                let parsed: Vec<Resp> = resp.json().await?;
                Ok(parsed.into_iter().next().map(|r| r.html_url))
            }
            Forge::GitLab { base_url, project_id, token } => {
                let url = format!(
                    "{base_url}/api/v4/projects/{}/merge_requests?source_branch={head_branch}&state=all",
                    percent_encode_project(project_id)
                );
                let resp = self
                    .execute_with_retry(cancel, || {
                        self.http.request(Method::GET, &url).header("PRIVATE-TOKEN", token).build().unwrap()
                    })
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    web_url: String,
                }
                let parsed: Vec<Resp> = resp.json().await?;
                Ok(parsed.into_iter().next().map(|r| r.web_url))
            }
        }
    }

    pub async fn get_pr_status(&self, forge: &Forge, number: u64, cancel: &CancellationToken) -> Result<PrStatus, ForgeError> {
        match forge {
            Forge::GitHub { api_base, owner, repo, token } => {
                let url = format!("{api_base}/repos/{owner}/{repo}/pulls/{number}");
                let resp = self
                    .execute_with_retry(cancel, || self.http.request(Method::GET, &url).bearer_auth(token).build().unwrap())
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    merged: bool,
                    merged_at: Option<String>,
                    state: String,
                    closed_at: Option<String>,
                }
                let parsed: Resp = resp.json().await?;
                Ok(PrStatus {
                    merged: parsed.merged,
                    merged_at: parsed.merged_at,
                    closed: parsed.state == "closed",
                    closed_at: parsed.closed_at,
                })
            }
            Forge::GitLab { base_url, project_id, token } => {
                let url =
                    format!("{base_url}/api/v4/projects/{}/merge_requests/{number}", percent_encode_project(project_id));
                let resp = self
                    .execute_with_retry(cancel, || {
                        self.http.request(Method::GET, &url).header("PRIVATE-TOKEN", token).build().unwrap()
                    })
                    .await?;
                #[derive(Deserialize)]
                struct Resp {
                    state: String,
                    merged_at: Option<String>,
                    closed_at: Option<String>,
                }
                let parsed: Resp = resp.json().await?;
                Ok(PrStatus {
                    merged: parsed.state == "merged",
                    merged_at: parsed.merged_at,
                    closed: parsed.state == "closed",
                    closed_at: parsed.closed_at,
                })
            }
        }
    }

    pub async fn merge_pr(
        &self,
        forge: &Forge,
        number: u64,
        method: MergeMethod,
        cancel: &CancellationToken,
    ) -> Result<(), ForgeError> {
        match forge {
            Forge::GitHub { api_base, owner, repo, token } => {
                let url = format!("{api_base}/repos/{owner}/{repo}/pulls/{number}/merge");
                #[derive(serde::Serialize)]
                struct Req {
                    merge_method: &'static str,
                }
                let merge_method = match method {
                    MergeMethod::Merge => "merge",
                    MergeMethod::Squash => "squash",
                    MergeMethod::Rebase => "rebase",
                };
                self.execute_with_retry(cancel, || {
                    self.http.request(Method::PUT, &url).bearer_auth(token).json(&Req { merge_method }).build().unwrap()
                })
                .await?;
                Ok(())
            }
            Forge::GitLab { base_url, project_id, token } => {
                let url =
                    format!("{base_url}/api/v4/projects/{}/merge_requests/{number}/merge", percent_encode_project(project_id));
                #[derive(serde::Serialize)]
                struct Req {
                    squash: bool,
                }
                self.execute_with_retry(cancel, || {
                    self.http
                        .request(Method::PUT, &url)
                        .header("PRIVATE-TOKEN", token)
                        .json(&Req { squash: method == MergeMethod::Squash })
                        .build()
                        .unwrap()
                })
                .await?;
                Ok(())
            }
        }
    }

    /// Aggregates GitHub check-runs for `sha` across all pages
    /// (`per_page=100`). GitLab is not wired here: it models pipeline
    /// status rather than per-check runs, so this is a GitHub-only
    /// operation for now.
    pub async fn check_runs_for_ref(
        &self,
        forge: &Forge,
        sha: &str,
        cancel: &CancellationToken,
    ) -> Result<CheckRunSummary, ForgeError> {
        let Forge::GitHub { api_base, owner, repo, token } = forge else {
            return Ok(CheckRunSummary::default());
        };

        #[derive(Deserialize)]
        struct Page {
            check_runs: Vec<CheckRun>,
        }
        #[derive(Deserialize)]
        struct CheckRun {
            name: String,
            status: String,
            conclusion: Option<String>,
            html_url: Option<String>,
        }

        let mut summary = CheckRunSummary::default();
        let mut page = 1;
        loop {
            let url = format!(
                "{api_base}/repos/{owner}/{repo}/commits/{sha}/check-runs?per_page=100&page={page}"
            );
            let resp = self
                .execute_with_retry(cancel, || self.http.request(Method::GET, &url).bearer_auth(token).build().unwrap())
                .await?;
            let parsed: Page = resp.json().await?;
            if parsed.check_runs.is_empty() {
                break;
            }
            let count = parsed.check_runs.len();
            for run in parsed.check_runs {
                match (run.status.as_str(), run.conclusion.as_deref()) {
                    ("completed", Some("success")) => summary.passed += 1,
                    ("completed", Some(_)) => {
                        summary.failed += 1;
                        if summary.first_failed.is_none() {
                            summary.first_failed = Some((run.name, run.html_url.unwrap_or_default()));
                        }
                    }
                    _ => summary.pending += 1,
                }
            }
            if count < 100 {
                break;
            }
            page += 1;
        }
        Ok(summary)
    }

    async fn execute_with_retry(
        &self,
        cancel: &CancellationToken,
        build: impl Fn() -> reqwest::Request,
    ) -> Result<reqwest::Response, ForgeError> {
        let mut attempt = 0;
        loop {
            let result = self.http.execute(build()).await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempt + 1 >= self.retry.max_attempts {
                        let body = truncate_body(resp.text().await.unwrap_or_default());
                        return Err(ForgeError::Http { status: status.as_u16(), body });
                    }
                    let retry_after = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after);
                    let delay = retry_after.unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                    if !self.retry.sleep_cancellable(delay, cancel).await {
                        return Err(ForgeError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if attempt + 1 >= self.retry.max_attempts {
                        return Err(ForgeError::Network(e));
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    if !self.retry.sleep_cancellable(delay, cancel).await {
                        return Err(ForgeError::Cancelled);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn truncate_body(body: String) -> String {
    if body.len() <= ERROR_BODY_CAP {
        body
    } else {
        let mut truncated = body.chars().take(ERROR_BODY_CAP).collect::<String>();
        truncated.push_str("... (truncated)");
        truncated
    }
}

fn percent_encode_project(project_id: &str) -> String {
    project_id.replace('/', "%2F")
}

/// Parses the trailing PR/MR number from a forge URL, per the
/// `/pull/(\d+)` and `/merge_requests/(\d+)` conventions.
pub fn parse_pr_number(url: &str) -> Result<u64, ForgeError> {
    for marker in ["/pull/", "/merge_requests/"] {
        if let Some(idx) = url.rfind(marker) {
            let tail = &url[idx + marker.len()..];
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(n) = digits.parse() {
                return Ok(n);
            }
        }
    }
    Err(ForgeError::UnrecognizedUrl(url.to_string()))
}

#[cfg(test)]
#[path = "forge_tests.rs"]
mod tests;
