//! Configuration management for mlflow-dbapp
//!
//! Settings are loaded from environment variables with sensible defaults.
//! CLI flags override individual fields after loading.
//!
//! # Environment Variables
//!
//! ## Asset pipeline
//! - `MLFLOW_DBAPP_PACKAGE`: Server package name - default: "mlflow"
//! - `MLFLOW_DBAPP_REQUIREMENTS`: Dependency manifest - default: "requirements.txt"
//! - `MLFLOW_DBAPP_STAGING_DIR`: Staged UI bundle - default: "mlflow-ui-assets"
//! - `MLFLOW_DBAPP_INDEX_URL`: Package index JSON API - default: "https://pypi.org/pypi"
//! - `MLFLOW_DBAPP_FILES_URL`: Source distribution host - default: "https://files.pythonhosted.org/packages/source"
//! - `MLFLOW_DBAPP_MAX_FILE_BYTES`: Hosting per-file ceiling - default: "10485760" (10MB)
//!
//! ## Startup
//! - `MLFLOW_SERVER_DIR`: Installed `mlflow/server` package directory - **required by `start`**
//! - `MLFLOW_DBAPP_SERVER_BIN`: Server executable - default: "mlflow"
//! - `MLFLOW_DBAPP_HOST`: Listen host - default: "0.0.0.0"
//! - `MLFLOW_DBAPP_PORT`: Listen port - default: "8000"
//!
//! ## Logging
//! - `MLFLOW_DBAPP_LOG_LEVEL`: Logging level - default: "info"
//!
//! The backend URIs (`MLFLOW_TRACKING_URI`, `MLFLOW_REGISTRY_URI`,
//! `MLFLOW_DEFAULT_ARTIFACT_ROOT`) are read separately by
//! [`crate::startup::BackendConfig`] because they belong to the launched server.

use crate::error::{DeployError, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULT_PACKAGE: &str = "mlflow";
const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
const DEFAULT_STAGING_DIR: &str = "mlflow-ui-assets";
const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";
const DEFAULT_FILES_URL: &str = "https://files.pythonhosted.org/packages/source";
const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_SERVER_BIN: &str = "mlflow";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Location of the UI bundle relative to the installed server package
pub const SERVER_ASSET_SUBDIR: &str = "js/build";

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Python package providing the server and the UI bundle
    pub package: String,

    /// Manifest holding the dependency declaration
    pub requirements_path: PathBuf,

    /// Where the normalized UI bundle is staged
    pub staging_dir: PathBuf,

    /// Package index JSON API base
    pub index_url: String,

    /// Base URL for source distributions
    pub files_url: String,

    /// Per-file ceiling enforced by the hosting platform
    pub max_file_bytes: u64,

    /// Installed `mlflow/server` directory, injected at deploy time
    pub server_dir: Option<PathBuf>,

    /// Server executable name or path
    pub server_bin: String,

    pub host: String,

    pub port: u16,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for DeployConfig {
    /// Loads from `MLFLOW_DBAPP_*` environment variables, falling back to defaults
    fn default() -> Self {
        let package = env::var("MLFLOW_DBAPP_PACKAGE").unwrap_or_else(|_| DEFAULT_PACKAGE.to_string());

        let requirements_path = env::var("MLFLOW_DBAPP_REQUIREMENTS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_REQUIREMENTS));

        let staging_dir = env::var("MLFLOW_DBAPP_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_DIR));

        let index_url =
            env::var("MLFLOW_DBAPP_INDEX_URL").unwrap_or_else(|_| DEFAULT_INDEX_URL.to_string());

        let files_url =
            env::var("MLFLOW_DBAPP_FILES_URL").unwrap_or_else(|_| DEFAULT_FILES_URL.to_string());

        let max_file_bytes = env::var("MLFLOW_DBAPP_MAX_FILE_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_MAX_FILE_BYTES);

        let server_dir = env::var("MLFLOW_SERVER_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let server_bin =
            env::var("MLFLOW_DBAPP_SERVER_BIN").unwrap_or_else(|_| DEFAULT_SERVER_BIN.to_string());

        let host = env::var("MLFLOW_DBAPP_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = env::var("MLFLOW_DBAPP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let log_level = env::var("MLFLOW_DBAPP_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            package,
            requirements_path,
            staging_dir,
            index_url,
            files_url,
            max_file_bytes,
            server_dir,
            server_bin,
            host,
            port,
            log_level,
        }
    }
}

impl DeployConfig {
    /// Validates the configuration
    ///
    /// `server_dir` is not checked here since only `start` needs it; see
    /// [`DeployConfig::server_asset_dir`].
    pub fn validate(&self) -> Result<()> {
        if self.package.trim().is_empty() {
            return Err(DeployError::config("Package name cannot be empty"));
        }

        if self.staging_dir.as_os_str().is_empty() {
            return Err(DeployError::config("Staging directory cannot be empty"));
        }

        for (name, url) in [("index URL", &self.index_url), ("files URL", &self.files_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DeployError::config(format!(
                    "Invalid {}: {} (expected http:// or https://)",
                    name, url
                )));
            }
        }

        if self.max_file_bytes == 0 {
            return Err(DeployError::config("Max file size must be at least 1 byte"));
        }

        if self.port == 0 {
            return Err(DeployError::config("Port must be between 1 and 65535"));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(DeployError::config(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// The server's UI asset directory, `<server_dir>/js/build`
    pub fn server_asset_dir(&self) -> Result<PathBuf> {
        let server_dir = self.server_dir.as_deref().ok_or_else(|| {
            DeployError::config(
                "Server directory not set. Set MLFLOW_SERVER_DIR or pass --server-dir \
                 (the installed mlflow/server package directory)",
            )
        })?;
        Ok(asset_dir_for(server_dir))
    }
}

pub fn asset_dir_for(server_dir: &Path) -> PathBuf {
    server_dir.join(SERVER_ASSET_SUBDIR)
}

impl fmt::Display for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mlflow-dbapp Configuration:")?;
        writeln!(f, "  Package: {}", self.package)?;
        writeln!(f, "  Requirements: {}", self.requirements_path.display())?;
        writeln!(f, "  Staging Dir: {}", self.staging_dir.display())?;
        writeln!(f, "  Index URL: {}", self.index_url)?;
        writeln!(f, "  Files URL: {}", self.files_url)?;
        writeln!(f, "  Max File Size: {} bytes", self.max_file_bytes)?;
        match &self.server_dir {
            Some(dir) => writeln!(f, "  Server Dir: {}", dir.display())?,
            None => writeln!(f, "  Server Dir: (not set)")?,
        }
        writeln!(f, "  Server: {} on {}:{}", self.server_bin, self.host, self.port)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
