// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing and rendering of git's diff3-style conflict markers.
//!
//! `<<<<<<<` opens a region, an optional `|||||||` introduces the common
//! ancestor ("base") text, `=======` separates ours from theirs, and
//! `>>>>>>>` closes the region. Text outside marker blocks is not
//! preserved: [`parse_conflicts`] extracts regions only, and
//! `parse_conflicts(&render_conflicts(regions)) == regions` is the
//! round-trip law this module guarantees.

use serde::{Deserialize, Serialize};

const OURS_MARKER: &str = "<<<<<<<";
const BASE_MARKER: &str = "|||||||";
const SPLIT_MARKER: &str = "=======";
const THEIRS_MARKER: &str = ">>>>>>>";

/// One side of a conflict region, used when selecting a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    Ours,
    Base,
    Theirs,
}

/// A single `<<<<<<< ... >>>>>>>` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub ours_label: String,
    pub ours_lines: Vec<String>,
    pub base_label: Option<String>,
    pub base_lines: Option<Vec<String>>,
    pub theirs_lines: Vec<String>,
    pub theirs_label: String,
}

impl ConflictRegion {
    /// The lines for the requested side, or `None` if that side is absent
    /// (only possible for `Base`, which diff3 markers may omit).
    pub fn side(&self, side: ConflictSide) -> Option<&[String]> {
        match side {
            ConflictSide::Ours => Some(&self.ours_lines),
            ConflictSide::Theirs => Some(&self.theirs_lines),
            ConflictSide::Base => self.base_lines.as_deref(),
        }
    }
}

/// Extracts every conflict region from `text`. Malformed or unterminated
/// marker blocks are skipped rather than erroring, matching the
/// best-effort way a rebase runner scans a working tree.
pub fn parse_conflicts(text: &str) -> Vec<ConflictRegion> {
    let lines: Vec<&str> = text.lines().collect();
    let mut regions = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if let Some(ours_label) = lines[i].strip_prefix(OURS_MARKER) {
            if let Some(region) = try_parse_region(&lines, &mut i, ours_label.trim()) {
                regions.push(region);
                continue;
            }
        }
        i += 1;
    }

    regions
}

/// Attempts to parse one region starting at `lines[*i]` (the opening
/// marker). On success, advances `*i` past the closing marker and returns
/// the region; on failure, leaves `*i` unchanged so the caller can
/// advance past the unmatched opening marker on its own.
fn try_parse_region(lines: &[&str], i: &mut usize, ours_label: &str) -> Option<ConflictRegion> {
    let start = *i;
    let mut cursor = start + 1;
    let mut ours_lines = Vec::new();
    let mut base_label = None;
    let mut base_lines = None;

    while cursor < lines.len()
        && !lines[cursor].starts_with(BASE_MARKER)
        && !lines[cursor].starts_with(SPLIT_MARKER)
    {
        ours_lines.push(lines[cursor].to_string());
        cursor += 1;
    }

    if cursor < lines.len() && lines[cursor].starts_with(BASE_MARKER) {
        base_label = Some(lines[cursor][BASE_MARKER.len()..].trim().to_string());
        cursor += 1;
        let mut collected = Vec::new();
        while cursor < lines.len() && !lines[cursor].starts_with(SPLIT_MARKER) {
            collected.push(lines[cursor].to_string());
            cursor += 1;
        }
        base_lines = Some(collected);
    }

    if cursor >= lines.len() || !lines[cursor].starts_with(SPLIT_MARKER) {
        return None;
    }
    cursor += 1;

    let mut theirs_lines = Vec::new();
    while cursor < lines.len() && !lines[cursor].starts_with(THEIRS_MARKER) {
        theirs_lines.push(lines[cursor].to_string());
        cursor += 1;
    }

    if cursor >= lines.len() {
        return None;
    }
    let theirs_label = lines[cursor][THEIRS_MARKER.len()..].trim().to_string();

    *i = cursor + 1;
    Some(ConflictRegion {
        ours_label: ours_label.to_string(),
        ours_lines,
        base_label,
        base_lines,
        theirs_lines,
        theirs_label,
    })
}

/// Renders regions back into marker-delimited text. Concatenating the
/// output of two calls and parsing it again yields the same list of
/// regions in the same order.
pub fn render_conflicts(regions: &[ConflictRegion]) -> String {
    let mut out = String::new();
    for region in regions {
        out.push_str(OURS_MARKER);
        if !region.ours_label.is_empty() {
            out.push(' ');
            out.push_str(&region.ours_label);
        }
        out.push('\n');
        for line in &region.ours_lines {
            out.push_str(line);
            out.push('\n');
        }
        if let Some(base_lines) = &region.base_lines {
            out.push_str(BASE_MARKER);
            if let Some(label) = &region.base_label {
                if !label.is_empty() {
                    out.push(' ');
                    out.push_str(label);
                }
            }
            out.push('\n');
            for line in base_lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str(SPLIT_MARKER);
        out.push('\n');
        for line in &region.theirs_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(THEIRS_MARKER);
        if !region.theirs_label.is_empty() {
            out.push(' ');
            out.push_str(&region.theirs_label);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
