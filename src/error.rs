//! Error taxonomy for the deployment harness
//!
//! Every variant is terminal for the run in which it occurs. Nothing here is
//! retried and there is no fallback between the index and source strategies.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a source build that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Clone,
    SparseCheckout,
    Checkout,
    Manifest,
    Install,
    Build,
    Output,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStep::Clone => "clone",
            BuildStep::SparseCheckout => "sparse-checkout",
            BuildStep::Checkout => "checkout",
            BuildStep::Manifest => "manifest",
            BuildStep::Install => "install",
            BuildStep::Build => "build",
            BuildStep::Output => "output",
        };
        f.write_str(name)
    }
}

/// Errors raised by the asset pipeline and startup wiring
#[derive(Debug, Error)]
pub enum DeployError {
    /// Malformed dependency declaration or missing configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Index path failure: network, missing version, or missing UI subtree
    #[error("Asset fetch failed: {message}")]
    AssetFetch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Source path failure, tagged with the step that failed
    #[error("Build failed at {step} step: {message}")]
    Build { step: BuildStep, message: String },

    /// No staged bundle at process start
    #[error("UI assets not found at {0} (run `mlflow-dbapp stage` before starting)")]
    MissingAssets(PathBuf),

    /// Filesystem failure with the path that caused it
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeployError {
    pub fn config(message: impl Into<String>) -> Self {
        DeployError::Configuration(message.into())
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        DeployError::AssetFetch {
            message: message.into(),
            source: None,
        }
    }

    pub fn fetch_caused_by(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DeployError::AssetFetch {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn build(step: BuildStep, message: impl Into<String>) -> Self {
        DeployError::Build {
            step,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Configuration(_) => "ConfigurationError",
            DeployError::AssetFetch { .. } => "AssetFetchError",
            DeployError::Build { .. } => "BuildError",
            DeployError::MissingAssets(_) => "MissingAssetsError",
            DeployError::Io { .. } => "IoError",
        }
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Attach a path to an `io::Result`
pub trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DeployError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_build_error_names_step() {
        let err = DeployError::build(BuildStep::Build, "yarn exited with status 1");
        let msg = err.to_string();
        assert!(msg.contains("build step"));
        assert!(msg.contains("yarn exited with status 1"));
        assert_eq!(err.kind(), "BuildError");
    }

    #[test]
    fn test_fetch_error_keeps_source() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = DeployError::fetch_caused_by("download failed", io_err);
        assert!(err.source().is_some());
        assert_eq!(err.kind(), "AssetFetchError");
    }

    #[test]
    fn test_io_context() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.at("/tmp/missing").unwrap_err();
        assert!(err.to_string().contains("/tmp/missing"));
    }

    #[test]
    fn test_missing_assets_message() {
        let err = DeployError::MissingAssets(PathBuf::from("mlflow-ui-assets"));
        assert!(err.to_string().contains("mlflow-ui-assets"));
        assert_eq!(err.kind(), "MissingAssetsError");
    }
}
