pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, InspectArgs, LogsArgs, StageArgs, StartArgs, VersionsArgs};
pub use output::{OutputFormat, OutputFormatter};
