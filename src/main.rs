use mlflow_dbapp::cli::commands::{CliArgs, Commands};
use mlflow_dbapp::cli::handlers::{
    handle_inspect, handle_logs, handle_stage, handle_start, handle_versions,
};
use mlflow_dbapp::util::logging::{init_logging, LoggingConfig};
use mlflow_dbapp::VERSION;

use clap::Parser;
use tracing::debug;

fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("mlflow-dbapp v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Inspect(inspect_args) => handle_inspect(inspect_args),
        Commands::Stage(stage_args) => handle_stage(stage_args),
        Commands::Start(start_args) => handle_start(start_args),
        Commands::Versions(versions_args) => handle_versions(versions_args),
        Commands::Logs(logs_args) => handle_logs(logs_args),
    };

    std::process::exit(exit_code);
}
