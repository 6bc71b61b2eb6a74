//! File-system helpers: session location, content types, download names.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .context("cannot determine home directory (HOME / USERPROFILE not set)")
}

/// `~/.docflow/session`.
pub fn default_session_file() -> Result<PathBuf> {
    Ok(home_dir()?.join(".docflow").join("session"))
}

/// Content type from the file extension, for the upload part header.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

/// Reduce a server-supplied file name to a bare name in the current
/// directory. Path components and leading dots are dropped.
pub fn safe_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.');
    if base.is_empty() {
        "document".to_owned()
    } else {
        base.to_owned()
    }
}
