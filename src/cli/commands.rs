use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deployment harness for the MLflow tracking server on Databricks Apps
#[derive(Parser, Debug)]
#[command(
    name = "mlflow-dbapp",
    about = "Deployment harness for the MLflow tracking server on Databricks Apps",
    version,
    author,
    long_about = "mlflow-dbapp stages the MLflow web UI bundle (from a released package or \
                  built from a source branch) and wires it into the server at app startup."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Show where the UI bundle would come from",
        long_about = "Classifies the server dependency declaration as a released version \
                      or a git branch.\n\n\
                      Examples:\n  \
                      mlflow-dbapp inspect\n  \
                      mlflow-dbapp inspect --dependency 'mlflow @ git+https://github.com/o/mlflow.git@dev'"
    )]
    Inspect(InspectArgs),

    #[command(
        about = "Fetch or build the UI bundle and stage it",
        long_about = "Runs the asset pipeline: resolve the dependency, fetch the bundle from \
                      the package index or build it from source, strip debug maps and stage \
                      it atomically.\n\n\
                      Examples:\n  \
                      mlflow-dbapp stage\n  \
                      mlflow-dbapp stage --dependency 'mlflow==3.3.1' --staging-dir ui"
    )]
    Stage(StageArgs),

    #[command(
        about = "Install the staged UI bundle and exec the server",
        long_about = "Copies the staged bundle into <server-dir>/js/build, logs the backend \
                      configuration and replaces this process with the MLflow server.\n\n\
                      Examples:\n  \
                      mlflow-dbapp start --server-dir /app/.venv/lib/python3.11/site-packages/mlflow/server"
    )]
    Start(StartArgs),

    #[command(
        about = "List released versions of the server package",
        long_about = "Lists releases newest first, the latest major grouped by minor \
                      version and older majors summarized.\n\n\
                      Examples:\n  \
                      mlflow-dbapp versions\n  \
                      mlflow-dbapp versions --json"
    )]
    Versions(VersionsArgs),

    #[command(
        about = "Stream logs from a deployed app",
        long_about = "Streams the app's /logz/stream endpoint using a token from the \
                      Databricks CLI.\n\n\
                      Examples:\n  \
                      mlflow-dbapp logs https://mlflow-123.aws.databricksapps.com\n  \
                      mlflow-dbapp logs https://mlflow-123.aws.databricksapps.com --search ERROR --duration 0"
    )]
    Logs(LogsArgs),
}

/// Where the dependency declaration comes from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(
        short = 'r',
        long,
        value_name = "FILE",
        help = "Dependency manifest to read the declaration from"
    )]
    pub requirements: Option<PathBuf>,

    #[arg(
        short = 'd',
        long,
        value_name = "DECLARATION",
        conflicts_with = "requirements",
        help = "Dependency declaration to use instead of the manifest"
    )]
    pub dependency: Option<String>,

    #[arg(short = 'p', long, value_name = "NAME", help = "Server package name")]
    pub package: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StageArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, value_name = "DIR", help = "Where to stage the UI bundle")]
    pub staging_dir: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StartArgs {
    #[arg(long, value_name = "DIR", help = "Installed mlflow/server package directory")]
    pub server_dir: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Staged UI bundle to install")]
    pub staging_dir: Option<PathBuf>,

    #[arg(long, value_name = "HOST", help = "Listen host")]
    pub host: Option<String>,

    #[arg(long, value_name = "PORT", help = "Listen port")]
    pub port: Option<u16>,

    #[arg(long, value_name = "BIN", help = "Server executable")]
    pub server_bin: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct VersionsArgs {
    #[arg(short = 'p', long, value_name = "NAME", help = "Package to list")]
    pub package: Option<String>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct LogsArgs {
    #[arg(value_name = "APP_URL", help = "Base URL of the deployed app")]
    pub app_url: String,

    #[arg(short = 's', long, value_name = "QUERY", help = "Only stream lines matching QUERY")]
    pub search: Option<String>,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value = "30",
        help = "Stop after SECONDS (0 streams until interrupted)"
    )]
    pub duration: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_stage_args() {
        let args = CliArgs::parse_from(["mlflow-dbapp", "stage"]);
        match args.command {
            Commands::Stage(stage) => {
                assert_eq!(stage.format, OutputFormatArg::Human);
                assert!(stage.source.requirements.is_none());
                assert!(stage.source.dependency.is_none());
                assert!(stage.staging_dir.is_none());
            }
            _ => panic!("Expected Stage command"),
        }
    }

    #[test]
    fn test_stage_with_dependency() {
        let args = CliArgs::parse_from([
            "mlflow-dbapp",
            "stage",
            "--dependency",
            "mlflow==3.3.1",
            "--staging-dir",
            "/tmp/ui",
        ]);
        match args.command {
            Commands::Stage(stage) => {
                assert_eq!(stage.source.dependency.as_deref(), Some("mlflow==3.3.1"));
                assert_eq!(stage.staging_dir, Some(PathBuf::from("/tmp/ui")));
            }
            _ => panic!("Expected Stage command"),
        }
    }

    #[test]
    fn test_dependency_conflicts_with_requirements() {
        let result = CliArgs::try_parse_from([
            "mlflow-dbapp",
            "inspect",
            "--dependency",
            "mlflow",
            "--requirements",
            "requirements.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_start_args() {
        let args = CliArgs::parse_from([
            "mlflow-dbapp",
            "start",
            "--server-dir",
            "/srv/mlflow/server",
            "--port",
            "9000",
        ]);
        match args.command {
            Commands::Start(start) => {
                assert_eq!(start.server_dir, Some(PathBuf::from("/srv/mlflow/server")));
                assert_eq!(start.port, Some(9000));
                assert!(start.host.is_none());
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_logs_default_duration() {
        let args = CliArgs::parse_from(["mlflow-dbapp", "logs", "https://app.example.com"]);
        match args.command {
            Commands::Logs(logs) => {
                assert_eq!(logs.app_url, "https://app.example.com");
                assert_eq!(logs.duration, 30);
                assert!(logs.search.is_none());
            }
            _ => panic!("Expected Logs command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["mlflow-dbapp", "versions", "--json", "-v"]);
        assert!(args.verbose);
        assert!(!args.quiet);
        match args.command {
            Commands::Versions(versions) => assert!(versions.json),
            _ => panic!("Expected Versions command"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["mlflow-dbapp", "-q", "-v", "inspect"]).is_err());
    }
}
