//! Subcommand handlers
//!
//! Each handler returns the process exit code. Errors are logged here and
//! reported on stderr; library code never exits the process.

use super::commands::{InspectArgs, LogsArgs, SourceArgs, StageArgs, StartArgs, VersionsArgs};
use super::output::OutputFormatter;
use crate::config::DeployConfig;
use crate::dependency::{inspect_manifest, normalize_name, AssetSource, Declaration};
use crate::error::{DeployError, Result};
use crate::index::{PackageIndex, PypiIndex};
use crate::logs::{fetch_token, LogStreamClient, StreamOptions};
use crate::pipeline::AssetPipeline;
use crate::source::SystemRunner;
use crate::staging::StagingArea;
use crate::startup::{log_platform_env, AssetInstaller, BackendConfig, ServerLaunch};
use crate::versions;
use std::io;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn report_error(err: &DeployError) -> i32 {
    error!(kind = err.kind(), "{}", err);
    eprintln!("Error: {}", err);
    1
}

fn print_output(output: anyhow::Result<String>) -> i32 {
    match output {
        Ok(text) => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn load_config() -> Result<DeployConfig> {
    let config = DeployConfig::default();
    config.validate()?;
    debug!("{}", config);
    Ok(config)
}

fn apply_source_overrides(config: &mut DeployConfig, args: &SourceArgs) {
    if let Some(package) = &args.package {
        config.package = package.clone();
    }
    if let Some(requirements) = &args.requirements {
        config.requirements_path = requirements.clone();
    }
}

/// Classifies an explicit declaration or the one found in the manifest
fn resolve_source(config: &DeployConfig, args: &SourceArgs) -> Result<AssetSource> {
    let Some(line) = &args.dependency else {
        info!(
            "Reading {} declaration from {}",
            config.package,
            config.requirements_path.display()
        );
        return inspect_manifest(&config.requirements_path, &config.package);
    };

    let declaration = Declaration::parse(line)?;
    if let Some(name) = &declaration.package {
        if normalize_name(name) != normalize_name(&config.package) {
            warn!(
                "Declaration names {} but the configured package is {}",
                name, config.package
            );
        }
    }
    Ok(declaration.source)
}

pub fn handle_inspect(args: &InspectArgs) -> i32 {
    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    apply_source_overrides(&mut config, &args.source);

    match resolve_source(&config, &args.source) {
        Ok(source) => {
            print_output(OutputFormatter::new(args.format.into()).format_source(&source))
        }
        Err(e) => report_error(&e),
    }
}

pub fn handle_stage(args: &StageArgs) -> i32 {
    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    apply_source_overrides(&mut config, &args.source);
    if let Some(dir) = &args.staging_dir {
        config.staging_dir = dir.clone();
    }

    match stage(&config, &args.source) {
        Ok(report) => {
            print_output(OutputFormatter::new(args.format.into()).format_report(&report))
        }
        Err(e) => report_error(&e),
    }
}

fn stage(config: &DeployConfig, args: &SourceArgs) -> Result<crate::pipeline::StageReport> {
    let source = resolve_source(config, args)?;
    let index = PypiIndex::new(&config.index_url, &config.files_url)?;
    let runner = SystemRunner;

    AssetPipeline::new(
        &index,
        &runner,
        config.package.as_str(),
        StagingArea::new(&config.staging_dir),
        config.max_file_bytes,
    )
    .run(&source)
}

/// Only returns when the server could not be started
pub fn handle_start(args: &StartArgs) -> i32 {
    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    if let Some(dir) = &args.server_dir {
        config.server_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.staging_dir {
        config.staging_dir = dir.clone();
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bin) = &args.server_bin {
        config.server_bin = bin.clone();
    }

    match start(&config) {
        Ok(launch) => match launch.exec() {
            Ok(code) => code,
            Err(e) => report_error(&e),
        },
        Err(e) => report_error(&e),
    }
}

fn start(config: &DeployConfig) -> Result<ServerLaunch> {
    log_platform_env();

    let asset_dir = config.server_asset_dir()?;
    let installer = AssetInstaller::new(&config.staging_dir, &asset_dir);
    installer.ensure_staged()?;

    // Checked before the copy so a misconfigured start leaves the server untouched
    let backend = BackendConfig::from_env()?;
    installer.install()?;

    info!("Host: {}:{}", config.host, config.port);
    backend.log();

    Ok(ServerLaunch {
        server_bin: config.server_bin.clone(),
        host: config.host.clone(),
        port: config.port,
        backend,
    })
}

pub fn handle_versions(args: &VersionsArgs) -> i32 {
    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    if let Some(package) = &args.package {
        config.package = package.clone();
    }

    let metadata = PypiIndex::new(&config.index_url, &config.files_url)
        .and_then(|index| index.project(&config.package));

    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) if args.json => {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            return 1;
        }
        Err(e) => return report_error(&e),
    };

    let releases = metadata.release_names();
    if args.json {
        let listing = versions::listing(metadata.latest(), &releases);
        debug!(versions = listing.total_versions, "Rendering version listing");
        print_output(
            serde_json::to_string_pretty(&listing)
                .map_err(|e| anyhow::anyhow!("Failed to serialize output to JSON: {}", e)),
        )
    } else {
        print_output(Ok(versions::render_human(
            &config.package,
            metadata.latest(),
            &releases,
        )))
    }
}

pub fn handle_logs(args: &LogsArgs) -> i32 {
    let token = match fetch_token() {
        Ok(token) => token,
        Err(e) => return report_error(&e),
    };

    let client = LogStreamClient::new(&args.app_url, token);
    let options = StreamOptions {
        search: args.search.clone(),
        duration: Duration::from_secs(args.duration),
    };

    eprintln!("Connecting to {}", client.stream_url());
    if args.duration > 0 {
        eprintln!("Streaming for {} seconds...", args.duration);
    } else {
        eprintln!("Streaming until interrupted...");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match client.stream(&options, &mut out) {
        Ok(summary) => {
            eprintln!("Received {} log messages", summary.messages);
            0
        }
        Err(e) => report_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn source_args(dependency: Option<&str>, requirements: Option<PathBuf>) -> SourceArgs {
        SourceArgs {
            requirements,
            dependency: dependency.map(str::to_string),
            package: Some("mlflow".to_string()),
        }
    }

    #[test]
    fn test_resolve_explicit_declaration() {
        let args = source_args(Some("mlflow==3.3.1"), None);
        let mut config = DeployConfig::default();
        apply_source_overrides(&mut config, &args);

        let source = resolve_source(&config, &args).unwrap();
        assert_eq!(
            source,
            AssetSource::Index {
                pinned: Some("3.3.1".to_string())
            }
        );
    }

    #[test]
    fn test_resolve_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("requirements.txt");
        fs::write(
            &manifest,
            "# deps\nrequests\nmlflow @ git+https://github.com/o/mlflow.git@feature/ui-fix\n",
        )
        .unwrap();

        let args = source_args(None, Some(manifest));
        let mut config = DeployConfig::default();
        apply_source_overrides(&mut config, &args);

        let source = resolve_source(&config, &args).unwrap();
        assert_eq!(
            source,
            AssetSource::Branch {
                repo_url: "https://github.com/o/mlflow.git".to_string(),
                branch: "feature/ui-fix".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_missing_manifest_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = source_args(None, Some(dir.path().join("missing.txt")));
        let mut config = DeployConfig::default();
        apply_source_overrides(&mut config, &args);

        assert!(resolve_source(&config, &args).is_err());
    }

    #[test]
    fn test_start_without_server_dir_fails_before_copy() {
        let mut config = DeployConfig::default();
        config.server_dir = None;
        let err = start(&config).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }
}
