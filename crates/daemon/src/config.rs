// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon config file: one `[daemon]` table plus one `[[projects]]` entry
//! per repository the daemon drives jobs against.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("project {0:?} has neither a github nor a gitlab forge configured")]
    NoForge(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    pub repos_root: PathBuf,
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    #[serde(default = "default_sync_interval_secs")]
    sync_interval_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub auto_pr: bool,
}

impl DaemonSettings {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("daemon.pid")
}
fn default_sync_interval_secs() -> u64 {
    30
}
fn default_max_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubForge {
    pub owner: String,
    pub repo: String,
    pub fork_owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabForge {
    pub base_url: String,
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptOverrides {
    pub plan: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub repo_url: String,
    pub base_branch: String,
    pub test_cmd: Option<String>,
    pub github: Option<GitHubForge>,
    pub gitlab: Option<GitLabForge>,
    #[serde(default)]
    pub prompts: PromptOverrides,
    pub max_auto_resolvable_conflict_lines: u64,
}

/// Forge tokens, kept out of the project bundle so they never round-trip
/// through a snapshot or log line. An env var of the same name always
/// wins over the config file, following the credential-handling precedent
/// set for git credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tokens {
    pub github: Option<String>,
    pub gitlab: Option<String>,
}

impl Tokens {
    pub fn github_token(&self) -> Option<String> {
        std::env::var("APR_GITHUB_TOKEN").ok().or_else(|| self.github.clone())
    }

    pub fn gitlab_token(&self) -> Option<String> {
        std::env::var("APR_GITLAB_TOKEN").ok().or_else(|| self.gitlab.clone())
    }
}

/// The LLM CLI binary and its argv template. `{prompt}` in `args` is
/// substituted with the rendered prompt at call time (see
/// `apr_adapters::provider::SubprocessProvider`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub binary: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub daemon: DaemonSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub tokens: Tokens,
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        for project in &config.projects {
            if project.github.is_none() && project.gitlab.is_none() {
                return Err(ConfigError::NoForge(project.name.clone()));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
