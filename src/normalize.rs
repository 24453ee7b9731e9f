//! Asset normalization
//!
//! Databricks Apps rejects oversized files. Source maps are the only routinely
//! oversized files in the UI bundle and the UI does not need them, so they are
//! removed before staging.

use crate::error::{DeployError, IoContext, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix of debug-map files removed from the bundle
pub const DEBUG_MAP_SUFFIX: &str = ".map";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Number of debug-map files deleted
    pub removed: usize,
    /// Number of regular files left in the tree
    pub remaining: usize,
    /// Files still above the per-file ceiling, with their sizes
    pub oversized: Vec<(PathBuf, u64)>,
}

pub fn is_debug_map(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(DEBUG_MAP_SUFFIX))
}

/// Removes every debug-map file under `root` and reports files over `max_file_bytes`.
///
/// Running it again on a normalized tree removes nothing.
pub fn normalize(root: &Path, max_file_bytes: u64) -> Result<NormalizeReport> {
    let mut report = NormalizeReport::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            DeployError::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_debug_map(path) {
            fs::remove_file(path).at(path)?;
            debug!("Removed debug map: {}", path.display());
            report.removed += 1;
            continue;
        }

        report.remaining += 1;
        let size = entry.metadata().map_err(|e| DeployError::io(path, e.into()))?.len();
        if size > max_file_bytes {
            warn!(
                size,
                limit = max_file_bytes,
                "File exceeds hosting size limit: {}",
                path.display()
            );
            report.oversized.push((path.to_path_buf(), size));
        }
    }

    debug!(
        removed = report.removed,
        remaining = report.remaining,
        "Normalized {}",
        root.display()
    );
    Ok(report)
}
