// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue-body sanitization before it ever reaches a prompt: HTML tags
//! are stripped, lines that read as prompt-injection directives are
//! neutralized, and the whole thing is capped to a sane length.

use regex::Regex;
use std::sync::OnceLock;

const MAX_BODY_CHARS: usize = 50_000;
const TRUNCATION_MARKER: &str = "… (truncated)";

const INJECTION_PREFIXES: &[&str] =
    &["ignore", "disregard", "override", "act as", "do not", "you are", "system", "assistant", "developer", "user"];

fn html_tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Strips HTML tags, neutralizes lines that look like a prompt-injection
/// directive, and truncates to [`MAX_BODY_CHARS`].
pub fn sanitize_issue_body(body: &str) -> String {
    let stripped = html_tag_pattern().replace_all(body, "");

    let neutralized: String = stripped
        .lines()
        .map(neutralize_line)
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(&neutralized, MAX_BODY_CHARS)
}

fn neutralize_line(line: &str) -> String {
    let trimmed_start = line.trim_start();
    let lower = trimmed_start.to_ascii_lowercase();
    if INJECTION_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        format!("> {line}")
    } else {
        line.to_string()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
