// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt templates for each pipeline step. Templates use `{{var}}`
//! placeholders against a fixed variable set; a project may override the
//! plan template with its own file on disk.

use std::collections::HashMap;
use std::path::Path;

const DEFAULT_PLAN_TEMPLATE: &str = "\
You are planning the implementation for the following issue.

Title: {{title}}

Body:
{{body}}

Produce a short, concrete implementation plan. List the files you expect \
to touch and the approach for each. Do not write code yet.";

const DEFAULT_IMPLEMENT_TEMPLATE: &str = "\
Implement the following plan against the current checkout.

Title: {{title}}

Plan:
{{plan}}

Make the minimal set of changes that satisfies the plan. Run any local \
checks you have available before finishing.";

const DEFAULT_CODE_REVIEW_TEMPLATE: &str = "\
Review the changes just made against the original plan for correctness, \
style, and completeness.

Plan:
{{plan}}

If the changes are acceptable, say so plainly. Otherwise, list concrete, \
actionable feedback.";

const DEFAULT_REVISE_TEMPLATE: &str = "\
The review of your previous change found issues. Address the feedback \
below and update the change accordingly.

Review feedback:
{{review_feedback}}";

const DEFAULT_RESOLVE_CONFLICTS_TEMPLATE: &str = "\
Rebasing onto {{base_branch}} produced conflicts in the following files:
{{conflict_files}}

Conflict details:
{{conflict_details}}

Resolve the conflicts, preserving the intent of both sides, then verify \
the result builds.";

/// Which canned template a step should render by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Plan,
    Implement,
    CodeReview,
    Revise,
    ResolveConflicts,
}

impl PromptKind {
    fn default_template(self) -> &'static str {
        match self {
            PromptKind::Plan => DEFAULT_PLAN_TEMPLATE,
            PromptKind::Implement => DEFAULT_IMPLEMENT_TEMPLATE,
            PromptKind::CodeReview => DEFAULT_CODE_REVIEW_TEMPLATE,
            PromptKind::Revise => DEFAULT_REVISE_TEMPLATE,
            PromptKind::ResolveConflicts => DEFAULT_RESOLVE_CONFLICTS_TEMPLATE,
        }
    }
}

/// The fixed set of substitution variables a prompt template may
/// reference. Unset variables render as an empty string.
#[derive(Debug, Default, Clone)]
pub struct PromptVars {
    vars: HashMap<&'static str, String>,
}

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(key, value.into());
        self
    }

    pub fn title(self, value: impl Into<String>) -> Self {
        self.set("title", value)
    }

    pub fn body(self, value: impl Into<String>) -> Self {
        self.set("body", value)
    }

    pub fn plan(self, value: impl Into<String>) -> Self {
        self.set("plan", value)
    }

    pub fn review_feedback(self, value: impl Into<String>) -> Self {
        self.set("review_feedback", value)
    }

    pub fn base_branch(self, value: impl Into<String>) -> Self {
        self.set("base_branch", value)
    }

    pub fn conflict_files(self, value: impl Into<String>) -> Self {
        self.set("conflict_files", value)
    }

    pub fn conflict_details(self, value: impl Into<String>) -> Self {
        self.set("conflict_details", value)
    }
}

/// Renders `template` by substituting every `{{var}}` occurrence found
/// in `vars`. A placeholder with no matching variable is left as-is.
pub fn render(template: &str, vars: &PromptVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start..].find("}}") else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;
        let key = rest[start + 2..end].trim();

        out.push_str(&rest[..start]);
        match vars.vars.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("{{");
                out.push_str(key);
                out.push_str("}}");
            }
        }
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Renders the prompt for `kind`, using `override_path`'s contents as the
/// template if the project has one on disk for this step (currently only
/// the plan step supports an override), falling back to the built-in
/// default template otherwise.
pub fn render_prompt(
    kind: PromptKind,
    vars: &PromptVars,
    override_path: Option<&Path>,
) -> std::io::Result<String> {
    let template = match override_path {
        Some(path) if path.is_file() => std::fs::read_to_string(path)?,
        _ => kind.default_template().to_string(),
    };
    Ok(render(&template, vars))
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
