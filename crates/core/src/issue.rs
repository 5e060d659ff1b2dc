// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The triggering entity: a forge issue eligible for pipeline pickup.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an issue, scoped to a single project.
    pub struct IssueId;
}

/// Which forge an issue was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    GitHub,
    GitLab,
}

crate::simple_display! {
    IssueSource {
        GitHub => "github",
        GitLab => "gitlab",
    }
}

/// Open/closed state as last observed on the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

crate::simple_display! {
    IssueState {
        Open => "open",
        Closed => "closed",
    }
}

/// A forge issue, as last synchronized by the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub source: IssueSource,
    pub project: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub url: String,
    pub state: IssueState,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Issue {
    /// Whether this issue carries the label the poller uses to mark it
    /// eligible for pickup.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct IssueBuilder => Issue {
        into {
            project: String = "acme/widgets",
            title: String = "Fix the thing",
            body: String = "Steps to reproduce...",
            url: String = "https://github.com/acme/widgets/issues/1"
        }
        set { number: u64 = 1 }
        computed { id: IssueId = IssueId::new("issue-test") }
        computed { source: IssueSource = IssueSource::GitHub }
        computed { labels: Vec<String> = vec!["pipeline".to_string()] }
        computed { state: IssueState = IssueState::Open }
        computed { created_at_ms: u64 = 1_000_000 }
        computed { updated_at_ms: u64 = 1_000_000 }
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
