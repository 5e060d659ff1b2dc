// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the state directory: `APR_STATE_DIR` > `XDG_STATE_HOME/apr` >
/// `~/.local/state/apr`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("APR_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("apr"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/apr"))
}

/// Path to the config file: `APR_CONFIG` or `<state_dir>/apr.toml`.
pub fn config_path(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("APR_CONFIG").map(PathBuf::from).unwrap_or_else(|_| state_dir.join("apr.toml"))
}
