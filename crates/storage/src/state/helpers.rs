// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

/// Looks up a value by exact id, falling back to a unique prefix match
/// (the way short commit hashes are resolved), the way operators refer
/// to jobs by their 8-character `short_id`.
pub fn find_by_prefix<'a, V>(map: &'a HashMap<String, V>, id: &str) -> Option<&'a V> {
    if let Some(v) = map.get(id) {
        return Some(v);
    }
    let mut matches = map.iter().filter(|(k, _)| k.starts_with(id));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first.1)
}
