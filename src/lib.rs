//! mlflow-dbapp - deployment harness for the MLflow tracking server on Databricks Apps
//!
//! The harness owns two procedures:
//!
//! - **Asset pipeline** (`stage`): decide where the MLflow web UI bundle comes
//!   from, either a released package on the package index or a build of a git
//!   branch, strip debug maps from it and stage it atomically.
//! - **Startup wiring** (`start`): copy the staged bundle into the installed
//!   server, log the backend configuration and replace the process with
//!   `mlflow server`.
//!
//! # Example Usage
//!
//! ```no_run
//! use mlflow_dbapp::{
//!     AssetPipeline, Declaration, PypiIndex, StagingArea, SystemRunner,
//! };
//!
//! # fn main() -> mlflow_dbapp::Result<()> {
//! let declaration = Declaration::parse("mlflow>=3.0.0")?;
//! let index = PypiIndex::new("https://pypi.org/pypi", "https://files.pythonhosted.org/packages/source")?;
//!
//! let report = AssetPipeline::new(
//!     &index,
//!     &SystemRunner,
//!     "mlflow",
//!     StagingArea::new("mlflow-ui-assets"),
//!     10 * 1024 * 1024,
//! )
//! .run(&declaration.source)?;
//!
//! println!("Staged {} files", report.files);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`dependency`]: classifies the dependency declaration
//! - [`index`] / [`source`]: the two ways of producing the bundle
//! - [`normalize`] / [`staging`]: cleanup and atomic commit
//! - [`pipeline`]: the state machine tying them together
//! - [`startup`]: app process startup

pub mod cli;
pub mod config;
pub mod dependency;
pub mod error;
pub mod fsutil;
pub mod index;
pub mod logs;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod staging;
pub mod startup;
pub mod util;
pub mod versions;

pub use config::DeployConfig;
pub use dependency::{inspect_manifest, AssetSource, Declaration};
pub use error::{BuildStep, DeployError, Result};
pub use index::{IndexProvider, PackageIndex, PypiIndex};
pub use normalize::{normalize, NormalizeReport};
pub use pipeline::{AssetPipeline, PipelineState, StageReport};
pub use source::runner::{CommandRunner, CommandSpec};
pub use source::{CommandOutcome, SourceProvider, SystemRunner};
pub use staging::{PendingBundle, StagingArea};
pub use startup::{AssetInstaller, BackendConfig, ServerLaunch};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
