//! Source-path asset provider
//!
//! Builds the UI bundle from a git branch: a shallow, tree-filtered,
//! single-branch clone narrowed by sparse checkout to the UI subtree, followed
//! by the UI project's own install and build scripts.

pub mod js_build;
pub mod runner;

use crate::error::{BuildStep, DeployError, IoContext, Result};
use crate::fsutil::{copy_tree, count_files};
use js_build::{PackageManifest, MANIFEST};
use runner::{CommandRunner, CommandSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use runner::{CommandOutcome, SystemRunner};

/// UI project location inside the server repository
pub const UI_SUBDIR: &str = "mlflow/server/js";

/// Directory the UI build writes its bundle to
pub const BUILD_OUTPUT_DIR: &str = "build";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBundle {
    pub tool: &'static str,
    pub files: usize,
}

pub struct SourceProvider<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    git: String,
    ui_subdir: PathBuf,
    output_dir: PathBuf,
}

impl<'a, R: CommandRunner + ?Sized> SourceProvider<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            git: "git".to_string(),
            ui_subdir: PathBuf::from(UI_SUBDIR),
            output_dir: PathBuf::from(BUILD_OUTPUT_DIR),
        }
    }

    /// Clones `branch` of `repo_url` under `scratch_root`, builds the UI and
    /// copies its output into `dest`. The clone is removed on every return path.
    pub fn provide(
        &self,
        repo_url: &str,
        branch: &str,
        scratch_root: &Path,
        dest: &Path,
    ) -> Result<SourceBundle> {
        let scratch = tempfile::Builder::new()
            .prefix("clone-")
            .tempdir_in(scratch_root)
            .at(scratch_root)?;
        let checkout = scratch.path().join("repo");

        self.clone_branch(repo_url, branch, scratch.path(), &checkout)?;

        let ui_dir = checkout.join(&self.ui_subdir);
        let manifest = self.read_manifest(&ui_dir)?;
        let tool = js_build::detect(&ui_dir, &manifest);
        info!(tool = tool.name(), "Building UI in {}", ui_dir.display());

        // Output existence is the success signal, so a stale bundle must not survive
        let output = ui_dir.join(&self.output_dir);
        if output.exists() {
            warn!("Removing pre-existing build output {}", output.display());
            fs::remove_dir_all(&output).at(&output)?;
        }

        let install_args = tool.install_args(js_build::has_lockfile(&ui_dir, tool));
        self.step(
            BuildStep::Install,
            CommandSpec::new(tool.name(), install_args, &ui_dir),
        )?;
        self.step(
            BuildStep::Build,
            CommandSpec::new(tool.name(), tool.build_args(), &ui_dir),
        )?;

        if !output.is_dir() || count_files(&output)? == 0 {
            return Err(DeployError::build(
                BuildStep::Output,
                format!(
                    "build finished but produced no files in {}",
                    output.display()
                ),
            ));
        }

        let files = copy_tree(&output, dest)?;
        info!(files, "Built UI bundle from {} @ {}", repo_url, branch);

        Ok(SourceBundle {
            tool: tool.name(),
            files,
        })
    }

    fn clone_branch(&self, repo_url: &str, branch: &str, cwd: &Path, checkout: &Path) -> Result<()> {
        let target = checkout.to_string_lossy().into_owned();
        self.step(
            BuildStep::Clone,
            CommandSpec::new(
                &self.git,
                [
                    "clone",
                    "--depth",
                    "1",
                    "--filter=tree:0",
                    "--single-branch",
                    "--branch",
                    branch,
                    "--no-checkout",
                    "--",
                    repo_url,
                    target.as_str(),
                ],
                cwd,
            ),
        )?;

        let subdir = self.ui_subdir.to_string_lossy().into_owned();
        self.step(
            BuildStep::SparseCheckout,
            CommandSpec::new(&self.git, ["sparse-checkout", "set", subdir.as_str()], checkout),
        )?;

        self.step(
            BuildStep::Checkout,
            CommandSpec::new(&self.git, ["checkout", branch], checkout),
        )
    }

    fn read_manifest(&self, ui_dir: &Path) -> Result<PackageManifest> {
        let path = ui_dir.join(MANIFEST);
        let content = fs::read_to_string(&path).map_err(|e| {
            DeployError::build(
                BuildStep::Manifest,
                format!("cannot read {}: {}", path.display(), e),
            )
        })?;

        let manifest = PackageManifest::parse(&content).map_err(|e| {
            DeployError::build(
                BuildStep::Manifest,
                format!("invalid {}: {}", path.display(), e),
            )
        })?;

        if !manifest.has_build_script() {
            return Err(DeployError::build(
                BuildStep::Manifest,
                format!("{} declares no \"build\" script", path.display()),
            ));
        }

        Ok(manifest)
    }

    fn step(&self, step: BuildStep, spec: CommandSpec) -> Result<()> {
        let outcome = self.runner.run(&spec).map_err(|e| {
            DeployError::build(step, format!("failed to run `{}`: {}", spec, e))
        })?;

        if !outcome.success {
            let mut message = format!("`{}` failed with {}", spec, outcome.describe_exit());
            if !outcome.output_tail.is_empty() {
                message.push('\n');
                message.push_str(&outcome.output_tail);
            }
            return Err(DeployError::build(step, message));
        }

        Ok(())
    }
}
