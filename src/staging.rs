//! All-or-nothing staging of the UI bundle
//!
//! Providers write into a scratch directory created next to the staging path.
//! Only [`PendingBundle::commit`] touches the staging path, by renaming. If the
//! pending bundle is dropped without a commit, the scratch directory is removed
//! and the staging path keeps its previous contents.

use crate::error::{DeployError, IoContext, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

const BUNDLE_DIR: &str = "bundle";
const PREVIOUS_DIR: &str = "previous";

/// The fixed location the startup wiring reads the bundle from
#[derive(Debug, Clone)]
pub struct StagingArea {
    target: PathBuf,
}

impl StagingArea {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn parent(&self) -> &Path {
        self.target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn scratch_prefix(&self) -> String {
        let name = self
            .target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("staging");
        format!(".{}-", name)
    }

    /// Removes scratch directories left behind by interrupted runs
    fn sweep_stale(&self, parent: &Path, prefix: &str) -> Result<()> {
        for entry in fs::read_dir(parent).at(parent)? {
            let entry = entry.at(parent)?;
            let is_stale = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(prefix));
            if is_stale && entry.file_type().at(entry.path())?.is_dir() {
                warn!("Removing stale scratch directory {}", entry.path().display());
                fs::remove_dir_all(entry.path()).at(entry.path())?;
            }
        }
        Ok(())
    }

    /// Creates the scratch directory providers write into
    pub fn begin(&self) -> Result<PendingBundle> {
        let parent = self.parent();
        fs::create_dir_all(parent).at(parent)?;

        let prefix = self.scratch_prefix();
        self.sweep_stale(parent, &prefix)?;

        let scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .at(parent)?;

        let bundle = scratch.path().join(BUNDLE_DIR);
        fs::create_dir_all(&bundle).at(&bundle)?;
        debug!("Staging scratch: {}", scratch.path().display());

        Ok(PendingBundle {
            scratch,
            bundle,
            target: self.target.clone(),
        })
    }
}

/// A bundle being assembled; dropped without commit means discarded
#[derive(Debug)]
pub struct PendingBundle {
    scratch: TempDir,
    bundle: PathBuf,
    target: PathBuf,
}

impl PendingBundle {
    /// Directory providers fill with the UI bundle
    pub fn path(&self) -> &Path {
        &self.bundle
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Swaps the assembled bundle into the staging path
    pub fn commit(self) -> Result<PathBuf> {
        let previous = self.scratch.path().join(PREVIOUS_DIR);
        let had_previous = self.target.exists();

        if had_previous {
            fs::rename(&self.target, &previous).at(&self.target)?;
        }

        if let Err(e) = fs::rename(&self.bundle, &self.target) {
            if had_previous {
                return Err(restore_previous(self.scratch, &previous, &self.target, e));
            }
            return Err(DeployError::io(&self.target, e));
        }

        info!("Staged UI assets at {}", self.target.display());
        Ok(self.target)
    }
}

/// Puts the old bundle back after a failed swap. If that fails too, the
/// scratch directory is kept so the old bundle is not deleted with it.
fn restore_previous(scratch: TempDir, previous: &Path, target: &Path, cause: io::Error) -> DeployError {
    let restore_err = match fs::rename(previous, target) {
        Ok(()) => return DeployError::io(target, cause),
        Err(e) => e,
    };

    let kept = scratch.keep();
    error!(
        "Could not restore previous UI bundle to {}; it is kept at {}",
        target.display(),
        previous.display()
    );
    DeployError::io(
        target,
        io::Error::new(
            cause.kind(),
            format!(
                "{}; restoring the previous bundle also failed ({}), it is kept in {}",
                cause,
                restore_err,
                kept.display()
            ),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::count_files;

    #[test]
    fn test_commit_replaces_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mlflow-ui-assets");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.js"), "old").unwrap();

        let area = StagingArea::new(&target);
        let pending = area.begin().unwrap();
        fs::write(pending.path().join("new.js"), "new").unwrap();
        let scratch = pending.scratch_path().to_path_buf();
        pending.commit().unwrap();

        assert!(target.join("new.js").exists());
        assert!(!target.join("old.js").exists());
        assert!(!scratch.exists());
    }

    #[test]
    fn test_drop_without_commit_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mlflow-ui-assets");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("index.html"), "keep").unwrap();

        let area = StagingArea::new(&target);
        let pending = area.begin().unwrap();
        fs::write(pending.path().join("partial.js"), "p").unwrap();
        let scratch = pending.scratch_path().to_path_buf();
        drop(pending);

        assert!(!scratch.exists());
        assert_eq!(count_files(&target).unwrap(), 1);
        assert_eq!(fs::read_to_string(target.join("index.html")).unwrap(), "keep");
    }

    #[test]
    fn test_begin_sweeps_interrupted_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mlflow-ui-assets");
        let stale = dir.path().join(".mlflow-ui-assets-abc123");
        fs::create_dir_all(stale.join("bundle")).unwrap();

        let pending = StagingArea::new(&target).begin().unwrap();

        assert!(!stale.exists());
        assert!(pending.path().exists());
    }

    #[test]
    fn test_commit_without_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/assets");

        let pending = StagingArea::new(&target).begin().unwrap();
        fs::write(pending.path().join("a.js"), "a").unwrap();
        pending.commit().unwrap();

        assert!(target.join("a.js").exists());
    }

    #[test]
    fn test_failed_swap_restores_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir_in(dir.path()).unwrap();
        let previous = scratch.path().join(PREVIOUS_DIR);
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join("index.html"), "old").unwrap();
        let target = dir.path().join("mlflow-ui-assets");

        let cause = io::Error::new(io::ErrorKind::Other, "swap failed");
        let err = restore_previous(scratch, &previous, &target, cause);

        assert!(matches!(err, DeployError::Io { .. }));
        assert_eq!(fs::read_to_string(target.join("index.html")).unwrap(), "old");
    }

    #[test]
    fn test_failed_restore_keeps_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir_in(dir.path()).unwrap();
        let scratch_path = scratch.path().to_path_buf();
        let previous = scratch_path.join(PREVIOUS_DIR);
        fs::create_dir_all(&previous).unwrap();
        fs::write(previous.join("index.html"), "old").unwrap();
        // Restoring into a missing parent directory fails
        let target = dir.path().join("gone/mlflow-ui-assets");

        let cause = io::Error::new(io::ErrorKind::Other, "swap failed");
        let err = restore_previous(scratch, &previous, &target, cause);

        let msg = err.to_string();
        assert!(msg.contains("swap failed"), "{}", msg);
        assert!(msg.contains(&scratch_path.display().to_string()), "{}", msg);
        assert_eq!(fs::read_to_string(previous.join("index.html")).unwrap(), "old");
    }
}
