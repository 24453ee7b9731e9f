//! Package index access and the index-path asset provider.
//!
//! The released source distribution ships the pre-built UI under
//! `mlflow/server/js/build`; only that subtree is extracted.

use crate::error::{DeployError, IoContext, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Path of the pre-built UI inside the released package
pub const UI_BUILD_SUBTREE: &str = "mlflow/server/js/build";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub version: String,
}

/// Subset of the index's project JSON (`GET <index>/<package>/json`)
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMetadata {
    pub info: ProjectInfo,
    #[serde(default)]
    pub releases: BTreeMap<String, serde_json::Value>,
}

impl ProjectMetadata {
    pub fn latest(&self) -> &str {
        &self.info.version
    }

    pub fn has_release(&self, version: &str) -> bool {
        self.releases.contains_key(version)
    }

    pub fn release_names(&self) -> Vec<String> {
        self.releases.keys().cloned().collect()
    }
}

/// Read access to a package index
pub trait PackageIndex {
    fn project(&self, package: &str) -> Result<ProjectMetadata>;

    /// Source distribution archive (`.tar.gz`) for `version`
    fn download_sdist(&self, package: &str, version: &str) -> Result<Vec<u8>>;
}

/// PyPI JSON API client
pub struct PypiIndex {
    client: reqwest::blocking::Client,
    index_url: String,
    files_url: String,
}

impl PypiIndex {
    pub fn new(index_url: impl Into<String>, files_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .user_agent(concat!("mlflow-dbapp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployError::fetch_caused_by("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            index_url: index_url.into().trim_end_matches('/').to_string(),
            files_url: files_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn project_url(&self, package: &str) -> String {
        format!("{}/{}/json", self.index_url, package)
    }

    /// `<files>/<initial>/<package>/<package>-<version>.tar.gz`
    pub fn sdist_url(&self, package: &str, version: &str) -> String {
        let initial = package
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('_');
        format!(
            "{}/{}/{}/{}-{}.tar.gz",
            self.files_url, initial, package, package, version
        )
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self.client.get(url).send().map_err(|e| {
            DeployError::fetch_caused_by(
                format!("Failed to reach {} (check network connectivity)", url),
                e,
            )
        })?;

        if !response.status().is_success() {
            return Err(DeployError::fetch(format!(
                "Request failed with HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(response)
    }
}

impl PackageIndex for PypiIndex {
    fn project(&self, package: &str) -> Result<ProjectMetadata> {
        let url = self.project_url(package);
        debug!("Querying package index: {}", url);
        self.get(&url)?
            .json::<ProjectMetadata>()
            .map_err(|e| DeployError::fetch_caused_by(format!("Invalid metadata from {}", url), e))
    }

    fn download_sdist(&self, package: &str, version: &str) -> Result<Vec<u8>> {
        let url = self.sdist_url(package, version);
        info!("Downloading {}", url);
        let bytes = self
            .get(&url)?
            .bytes()
            .map_err(|e| DeployError::fetch_caused_by("Failed to read archive body", e))?;

        if bytes.is_empty() {
            return Err(DeployError::fetch(format!(
                "Downloaded archive is empty (HTTP 200 but 0 bytes) from {}",
                url
            )));
        }

        Ok(bytes.to_vec())
    }
}

/// Resolved result of an index-path run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBundle {
    pub version: String,
    pub files: usize,
}

/// Produces a UI bundle from a released version
pub struct IndexProvider<'a, I: PackageIndex + ?Sized> {
    index: &'a I,
    package: String,
    subtree: PathBuf,
}

impl<'a, I: PackageIndex + ?Sized> IndexProvider<'a, I> {
    pub fn new(index: &'a I, package: impl Into<String>) -> Self {
        Self {
            index,
            package: package.into(),
            subtree: PathBuf::from(UI_BUILD_SUBTREE),
        }
    }

    /// Resolves `pinned` or the latest release, then extracts its UI into `dest`
    pub fn provide(&self, pinned: Option<&str>, dest: &Path) -> Result<IndexBundle> {
        let metadata = self.index.project(&self.package)?;

        let version = match pinned {
            Some(v) => {
                if !metadata.releases.is_empty() && !metadata.has_release(v) {
                    return Err(DeployError::fetch(format!(
                        "Version {} of {} not found in package index",
                        v, self.package
                    )));
                }
                v.to_string()
            }
            None => metadata.latest().to_string(),
        };

        if version.trim().is_empty() {
            return Err(DeployError::fetch(format!(
                "Package index returned no version for {}",
                self.package
            )));
        }

        info!(package = %self.package, %version, "Resolved released version");

        let archive = self.index.download_sdist(&self.package, &version)?;
        let files = extract_subtree(&archive, &self.subtree, dest)?;
        info!(files, "Extracted UI bundle from {}-{}", self.package, version);

        Ok(IndexBundle { version, files })
    }
}

/// Path of `entry` relative to `subtree`, ignoring the archive's top-level
/// directory (`<package>-<version>/`). `None` when outside the subtree.
fn relative_to_subtree(entry: &Path, subtree: &Path) -> Option<PathBuf> {
    let mut components = entry.components();
    components.next()?;
    let inner: PathBuf = components.collect();
    let rel = inner.strip_prefix(subtree).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_path_buf())
}

fn is_safe(rel: &Path) -> bool {
    rel.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Unpacks the entries of a `.tar.gz` under `subtree` into `dest`.
/// Returns the number of files written.
pub fn extract_subtree(archive: &[u8], subtree: &Path, dest: &Path) -> Result<usize> {
    let mut decoder = flate2::read::MultiGzDecoder::new(archive);
    let mut tar_data = Vec::new();
    decoder
        .read_to_end(&mut tar_data)
        .map_err(|e| DeployError::fetch_caused_by("Failed to decompress archive (invalid gzip format)", e))?;

    let mut archive = tar::Archive::new(&tar_data[..]);
    let entries = archive
        .entries()
        .map_err(|e| DeployError::fetch_caused_by("Failed to read tar entries (invalid tar format)", e))?;

    let mut files = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| DeployError::fetch_caused_by("Failed to read tar entry", e))?;
        let path = entry
            .path()
            .map_err(|e| DeployError::fetch_caused_by("Failed to get entry path", e))?
            .into_owned();

        let Some(rel) = relative_to_subtree(&path, subtree) else {
            continue;
        };

        if !is_safe(&rel) {
            return Err(DeployError::fetch(format!(
                "Refusing unsafe archive entry {}",
                path.display()
            )));
        }

        let target = dest.join(&rel);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target).at(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            entry.unpack(&target).at(&target)?;
            files += 1;
        } else {
            debug!("Skipping non-regular archive entry {}", path.display());
        }
    }

    if files == 0 {
        return Err(DeployError::fetch(format!(
            "Archive does not contain the UI bundle ({})",
            subtree.display()
        )));
    }

    Ok(files)
}
