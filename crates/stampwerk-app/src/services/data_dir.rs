// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use stampwerk_core::error::Result;

/// Subdirectory served to clients as `/uploads/{name}`.
pub const UPLOADS_DIR: &str = "uploads";

/// Ledger database file inside the data directory.
pub const LEDGER_FILE: &str = "ledger.db";

/// Resolve the data directory and make sure it exists.
///
/// An explicit override wins; otherwise `$XDG_DATA_HOME/stampwerk`, then
/// `$HOME/.local/share/stampwerk`.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(path) => path.to_path_buf(),
        None => dirs_fallback().join("stampwerk"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Return a subdirectory inside `base` (e.g. "uploads"), creating it if needed.
pub fn data_subdir(base: &Path, name: &str) -> Result<PathBuf> {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn dirs_fallback() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
