//! Structured logging setup for mlflow-dbapp
//!
//! Logs go to stderr so that command output on stdout stays parseable. The
//! subscriber can only be installed once per process.
//!
//! # Example
//!
//! ```no_run
//! use mlflow_dbapp::util::logging::{init_logging, LoggingConfig};
//!
//! init_logging(LoggingConfig::from_flags(None, false, false));
//!
//! tracing::info!(files = 8, "UI assets staged");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

pub const LOG_LEVEL_VAR: &str = "MLFLOW_DBAPP_LOG_LEVEL";
pub const LOG_JSON_VAR: &str = "MLFLOW_DBAPP_LOG_JSON";

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate's events
    pub level: Level,

    /// Use JSON output format (for log collectors on the hosting platform)
    pub use_json: bool,

    /// Include the module target (e.g., mlflow_dbapp::staging) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Resolves the level from CLI flags, falling back to `MLFLOW_DBAPP_LOG_LEVEL`
    ///
    /// An explicit `--log-level` wins over `-v`/`-q`.
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level_str) = log_level {
            parse_level(level_str)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            parse_level(&env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string()))
        };

        Self {
            level,
            use_json: json_from_env(),
            ..Default::default()
        }
    }
}

/// Parses a log level, case-insensitively; unknown values fall back to INFO
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn json_from_env() -> bool {
    env::var(LOG_JSON_VAR)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

/// Directives applied when `RUST_LOG` is not set
pub fn default_directives(level: Level) -> Vec<Directive> {
    [
        format!("mlflow_dbapp={}", level.as_str().to_lowercase()),
        "h2=warn".to_string(),
        "hyper=warn".to_string(),
        "reqwest=warn".to_string(),
    ]
    .iter()
    .filter_map(|d| d.parse().ok())
    .collect()
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            for directive in default_directives(config.level) {
                filter = filter.add_directive(directive);
            }
        }

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_explicit_level_wins_over_flags() {
        let config = LoggingConfig::from_flags(Some("warn"), true, false);
        assert_eq!(config.level, Level::WARN);
    }

    #[test]
    fn test_verbose_and_quiet() {
        assert_eq!(LoggingConfig::from_flags(None, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_flags(None, false, true).level, Level::ERROR);
    }

    #[test]
    #[serial]
    fn test_level_from_env() {
        let old = env::var(LOG_LEVEL_VAR).ok();
        env::set_var(LOG_LEVEL_VAR, "trace");

        let level = LoggingConfig::from_flags(None, false, false).level;

        match old {
            Some(v) => env::set_var(LOG_LEVEL_VAR, v),
            None => env::remove_var(LOG_LEVEL_VAR),
        }
        assert_eq!(level, Level::TRACE);
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(Level::DEBUG).len(), 4);
        assert_eq!(default_directives(Level::ERROR).len(), 4);
    }
}
