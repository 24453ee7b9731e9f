//! Asset pipeline: inspect → provide → normalize → stage
//!
//! Strictly sequential. The strategy is chosen once from the declared
//! dependency; any failure moves to `Failed` and nothing is staged.

use crate::dependency::AssetSource;
use crate::error::{BuildStep, DeployError, Result};
use crate::fsutil::count_files;
use crate::index::{IndexProvider, PackageIndex};
use crate::normalize::{normalize, NormalizeReport};
use crate::source::runner::CommandRunner;
use crate::source::SourceProvider;
use crate::staging::StagingArea;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Inspecting,
    FetchingIndexAsset,
    BuildingFromSource,
    Normalizing,
    Staged,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Inspecting => "inspecting",
            PipelineState::FetchingIndexAsset => "fetching-index-asset",
            PipelineState::BuildingFromSource => "building-from-source",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Staged => "staged",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct StageReport {
    pub source: AssetSource,
    /// Released version for index runs
    pub version: Option<String>,
    pub staged_at: PathBuf,
    pub files: usize,
    pub normalize: NormalizeReport,
}

pub struct AssetPipeline<'a> {
    index: &'a dyn PackageIndex,
    runner: &'a dyn CommandRunner,
    package: String,
    staging: StagingArea,
    max_file_bytes: u64,
    state: PipelineState,
}

impl<'a> AssetPipeline<'a> {
    pub fn new(
        index: &'a dyn PackageIndex,
        runner: &'a dyn CommandRunner,
        package: impl Into<String>,
        staging: StagingArea,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            index,
            runner,
            package: package.into(),
            staging,
            max_file_bytes,
            state: PipelineState::Inspecting,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Asset pipeline");
        self.state = next;
    }

    /// Runs the pipeline for an already inspected source
    pub fn run(&mut self, source: &AssetSource) -> Result<StageReport> {
        self.state = PipelineState::Inspecting;
        info!(%source, "Resolved UI asset source");

        let result = self.run_inner(source);
        if let Err(e) = &result {
            error!(kind = e.kind(), "Asset pipeline failed: {}", e);
            self.transition(PipelineState::Failed);
        }
        result
    }

    fn run_inner(&mut self, source: &AssetSource) -> Result<StageReport> {
        let pending = self.staging.begin()?;

        let version = match source {
            AssetSource::Index { pinned } => {
                self.transition(PipelineState::FetchingIndexAsset);
                let bundle = IndexProvider::new(self.index, self.package.as_str())
                    .provide(pinned.as_deref(), pending.path())?;
                Some(bundle.version)
            }
            AssetSource::Branch { repo_url, branch } => {
                self.transition(PipelineState::BuildingFromSource);
                SourceProvider::new(self.runner).provide(
                    repo_url,
                    branch,
                    pending.scratch_path(),
                    pending.path(),
                )?;
                None
            }
        };

        self.transition(PipelineState::Normalizing);
        let report = normalize(pending.path(), self.max_file_bytes)?;

        let files = count_files(pending.path())?;
        if files == 0 {
            let message = "bundle is empty after normalization";
            return Err(match source {
                AssetSource::Index { .. } => DeployError::fetch(message),
                AssetSource::Branch { .. } => DeployError::build(BuildStep::Output, message),
            });
        }

        let staged_at = pending.commit()?;
        self.transition(PipelineState::Staged);

        Ok(StageReport {
            source: source.clone(),
            version,
            staged_at,
            files,
            normalize: report,
        })
    }
}
