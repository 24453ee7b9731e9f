//! JavaScript build tools for the UI project
//!
//! The UI subtree is an ordinary JS project. Its package manager is taken from
//! the `packageManager` field of `package.json`, then from lockfiles, and
//! defaults to npm.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest every buildable UI subtree must contain
pub const MANIFEST: &str = "package.json";

/// The subset of `package.json` used for detection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn has_build_script(&self) -> bool {
        self.scripts.contains_key("build")
    }
}

pub trait JsBuildTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lockfiles that identify this tool
    fn lockfiles(&self) -> &[&'static str];

    fn install_args(&self, has_lockfile: bool) -> Vec<String>;

    fn build_args(&self) -> Vec<String> {
        vec!["run".to_string(), "build".to_string()]
    }
}

pub struct Npm;

impl JsBuildTool for Npm {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn lockfiles(&self) -> &[&'static str] {
        &["package-lock.json", "npm-shrinkwrap.json"]
    }

    fn install_args(&self, has_lockfile: bool) -> Vec<String> {
        if has_lockfile {
            vec!["ci".to_string()]
        } else {
            vec!["install".to_string()]
        }
    }
}

pub struct Yarn;

impl JsBuildTool for Yarn {
    fn name(&self) -> &'static str {
        "yarn"
    }

    fn lockfiles(&self) -> &[&'static str] {
        &["yarn.lock"]
    }

    fn install_args(&self, has_lockfile: bool) -> Vec<String> {
        if has_lockfile {
            vec!["install".to_string(), "--immutable".to_string()]
        } else {
            vec!["install".to_string()]
        }
    }
}

pub struct Pnpm;

impl JsBuildTool for Pnpm {
    fn name(&self) -> &'static str {
        "pnpm"
    }

    fn lockfiles(&self) -> &[&'static str] {
        &["pnpm-lock.yaml"]
    }

    fn install_args(&self, has_lockfile: bool) -> Vec<String> {
        if has_lockfile {
            vec!["install".to_string(), "--frozen-lockfile".to_string()]
        } else {
            vec!["install".to_string()]
        }
    }
}

static TOOLS: [&dyn JsBuildTool; 3] = [&Yarn, &Pnpm, &Npm];

/// Picks the build tool for a UI project directory
pub fn detect(dir: &Path, manifest: &PackageManifest) -> &'static dyn JsBuildTool {
    if let Some(declared) = manifest.package_manager.as_deref() {
        let name = declared.split('@').next().unwrap_or(declared);
        if let Some(tool) = TOOLS.iter().find(|t| t.name() == name) {
            return *tool;
        }
    }

    TOOLS
        .iter()
        .find(|t| t.lockfiles().iter().any(|l| dir.join(l).is_file()))
        .copied()
        .unwrap_or(&Npm)
}

pub fn has_lockfile(dir: &Path, tool: &dyn JsBuildTool) -> bool {
    tool.lockfiles().iter().any(|l| dir.join(l).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_lockfile() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let tool = detect(dir.path(), &PackageManifest::default());
        assert_eq!(tool.name(), "yarn");
        assert!(has_lockfile(dir.path(), tool));
        assert_eq!(tool.install_args(true), vec!["install", "--immutable"]);
    }

    #[test]
    fn test_detect_from_package_manager_field() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        let manifest =
            PackageManifest::parse(r#"{"packageManager": "pnpm@9.1.0", "scripts": {}}"#).unwrap();
        assert_eq!(detect(dir.path(), &manifest).name(), "pnpm");
    }

    #[test]
    fn test_detect_defaults_to_npm() {
        let dir = TempDir::new().unwrap();
        let tool = detect(dir.path(), &PackageManifest::default());
        assert_eq!(tool.name(), "npm");
        assert_eq!(tool.install_args(false), vec!["install"]);
        assert_eq!(tool.build_args(), vec!["run", "build"]);
    }

    #[test]
    fn test_manifest_build_script() {
        let manifest =
            PackageManifest::parse(r#"{"name": "ui", "scripts": {"build": "craco build"}}"#)
                .unwrap();
        assert!(manifest.has_build_script());
        assert!(!PackageManifest::default().has_build_script());
    }
}
