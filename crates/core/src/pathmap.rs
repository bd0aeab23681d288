//! Remote-to-local path mapping.
//!
//! Download clients report paths from their own filesystem view; the
//! organizer needs the same files under a locally visible prefix. Mapping is
//! a plain prefix substitution, no separator normalization.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix substitution applied to a client-reported path.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PathMapping {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub local_path: String,
}

/// Apply a path mapping to a client-reported path.
///
/// Disabled mappings and paths outside `remote_path` pass through unchanged;
/// otherwise only the prefix is replaced, the remainder stays byte-identical.
pub fn transform(path: &str, mapping: &PathMapping) -> String {
    if !mapping.enabled {
        return path.to_string();
    }
    match path.strip_prefix(mapping.remote_path.as_str()) {
        Some(rest) => format!("{}{}", mapping.local_path, rest),
        None => path.to_string(),
    }
}

/// Compose the fallback download location for a client:
/// `download_dir` / `custom_path` (if any) / `name`.
pub fn compose(download_dir: &Path, custom_path: Option<&str>, name: &str) -> PathBuf {
    let mut path = download_dir.to_path_buf();
    if let Some(custom) = custom_path {
        if !custom.is_empty() {
            path.push(custom);
        }
    }
    path.push(name);
    path
}
