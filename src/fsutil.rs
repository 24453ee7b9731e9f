//! Directory tree helpers shared by the providers and startup wiring

use crate::error::{DeployError, IoContext, Result};
use std::fs;
use std::path::Path;
use tracing::trace;
use walkdir::WalkDir;

fn walk_error(root: &Path, e: walkdir::Error) -> DeployError {
    let path = e.path().unwrap_or(root).to_path_buf();
    DeployError::io(path, e.into())
}

/// Recursively copies `src` into `dst`, creating `dst` if needed.
/// Existing files with the same relative path are overwritten.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).at(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| DeployError::io(entry.path(), std::io::Error::other(e)))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            fs::copy(entry.path(), &target).at(entry.path())?;
            trace!("Copied {} -> {}", entry.path().display(), target.display());
            copied += 1;
        }
    }

    Ok(copied)
}

/// Removes everything inside `dir` but keeps `dir` itself
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        let path = entry.path();
        if entry.file_type().at(&path)?.is_dir() {
            fs::remove_dir_all(&path).at(&path)?;
        } else {
            fs::remove_file(&path).at(&path)?;
        }
    }
    Ok(())
}

/// Makes `dst` hold exactly the files of `src`
pub fn replace_tree(src: &Path, dst: &Path) -> Result<usize> {
    clear_dir(dst)?;
    copy_tree(src, dst)
}

/// Number of regular files under `root`; zero if `root` does not exist
pub fn count_files(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}
