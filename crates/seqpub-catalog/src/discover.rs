//! Directory discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::lookup::DiscoveryError;

/// Name of the default checkpoint file, never treated as run output.
pub const DEFAULT_RESTART_FILE: &str = "published.json";

/// List every regular file below `root`, sorted by path.
///
/// Hidden files (leading `.`) and the checkpoint file are left out, so
/// in-flight temporary checkpoints are never mistaken for run output.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry.map_err(|e| DiscoveryError::Walk {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name == DEFAULT_RESTART_FILE {
            continue;
        }

        files.push(entry.into_path());
    }

    files.sort();
    Ok(files)
}
