//! Log streaming from a deployed app's `/logz/stream` endpoint
//!
//! The endpoint speaks server-sent events. Each `data:` line is either a JSON
//! log entry or a single NUL byte meaning "no logs yet".

use crate::error::{DeployError, Result};
use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use std::env;
use std::io::{BufRead, BufReader, Write};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const NO_LOGS_MARKER: &str = "\u{0}";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    NoLogs,
    Entry(LogEntry),
    Raw(String),
}

/// Parses one SSE line; `None` for blank lines and non-data fields
pub fn parse_event_line(line: &str) -> Option<LogEvent> {
    let data = line.strip_prefix("data: ")?;
    if data == NO_LOGS_MARKER {
        return Some(LogEvent::NoLogs);
    }
    Some(match serde_json::from_str::<LogEntry>(data) {
        Ok(entry) => LogEvent::Entry(entry),
        Err(_) => LogEvent::Raw(data.to_string()),
    })
}

/// `[HH:MM:SS] SOURCE: message`, source padded to six columns
pub fn format_entry(entry: &LogEntry) -> String {
    let time = entry
        .timestamp
        .filter(|ts| *ts > 0.0)
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.trunc() as i64, 0))
        .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| " ".repeat(8));

    let source = entry.source.as_deref().unwrap_or("UNKNOWN");
    let source: String = source.chars().take(6).collect();

    format!(
        "[{}] {:<6}: {}",
        time,
        source,
        entry.message.as_deref().unwrap_or("")
    )
}

/// Arguments for `databricks auth token`, preferring a configured profile
pub fn token_command_args(profile: Option<&str>, host: Option<&str>) -> Result<Vec<String>> {
    let mut args = vec!["auth".to_string(), "token".to_string()];
    match (profile.filter(|p| !p.is_empty()), host.filter(|h| !h.is_empty())) {
        (Some(profile), _) => args.extend(["--profile".to_string(), profile.to_string()]),
        (None, Some(host)) => args.extend(["--host".to_string(), host.to_string()]),
        (None, None) => {
            return Err(DeployError::config(
                "Neither DATABRICKS_CONFIG_PROFILE nor DATABRICKS_HOST environment variable is set",
            ))
        }
    }
    Ok(args)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// The CLI prints either JSON with `access_token` or the bare token
pub fn parse_token_output(stdout: &str) -> String {
    let trimmed = stdout.trim();
    serde_json::from_str::<TokenResponse>(trimmed)
        .ok()
        .and_then(|r| r.access_token)
        .unwrap_or_else(|| trimmed.to_string())
}

/// Obtains a bearer token through the Databricks CLI
pub fn fetch_token() -> Result<String> {
    let profile = env::var("DATABRICKS_CONFIG_PROFILE").ok();
    let host = env::var("DATABRICKS_HOST").ok();
    let args = token_command_args(profile.as_deref(), host.as_deref())?;

    let output = Command::new("databricks").args(&args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeployError::config("databricks CLI not found. Please install the Databricks CLI.")
        } else {
            DeployError::config(format!("Failed to run databricks CLI: {}", e))
        }
    })?;

    if !output.status.success() {
        return Err(DeployError::config(format!(
            "Failed to get OAuth token: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_token_output(&String::from_utf8_lossy(&output.stdout)))
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub search: Option<String>,
    /// Zero streams until interrupted
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub messages: usize,
    pub timed_out: bool,
}

pub struct LogStreamClient {
    stream_url: String,
    token: String,
}

impl LogStreamClient {
    pub fn new(app_url: &str, token: impl Into<String>) -> Self {
        Self {
            stream_url: format!("{}/logz/stream", app_url.trim_end_matches('/')),
            token: token.into(),
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Streams log lines to `out` until the duration elapses or the server closes
    pub fn stream(&self, options: &StreamOptions, out: &mut dyn Write) -> Result<StreamSummary> {
        let mut builder = reqwest::blocking::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        builder = if options.duration.is_zero() {
            builder.timeout(None)
        } else {
            builder.timeout(options.duration + CONNECT_TIMEOUT)
        };
        let client = builder
            .build()
            .map_err(|e| DeployError::fetch_caused_by("Failed to create HTTP client", e))?;

        let mut request = client
            .get(&self.stream_url)
            .bearer_auth(&self.token)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        if let Some(q) = options.search.as_deref().filter(|q| !q.is_empty()) {
            request = request.query(&[("q", q)]);
        }

        let response = request.send().map_err(|e| {
            DeployError::fetch_caused_by(format!("Failed to connect to {}", self.stream_url), e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let hint = if status.as_u16() == 503 {
                " (the app may be starting up, try again in a few seconds)"
            } else if body.to_lowercase().contains("oidc") {
                " (authentication required, log in via the browser first)"
            } else {
                ""
            };
            return Err(DeployError::fetch(format!(
                "Failed to connect: HTTP {}{}",
                status, hint
            )));
        }

        let started = Instant::now();
        let mut summary = StreamSummary::default();

        for line in BufReader::new(response).lines() {
            if !options.duration.is_zero() && started.elapsed() > options.duration {
                break;
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!("Log stream ended: {}", e);
                    summary.timed_out = true;
                    break;
                }
            };

            let rendered = match parse_event_line(&line) {
                None => continue,
                Some(LogEvent::NoLogs) if summary.messages == 0 => "No logs available yet".to_string(),
                Some(LogEvent::NoLogs) => continue,
                Some(LogEvent::Entry(entry)) => {
                    summary.messages += 1;
                    format_entry(&entry)
                }
                Some(LogEvent::Raw(data)) => {
                    summary.messages += 1;
                    data
                }
            };

            writeln!(out, "{}", rendered).map_err(|e| DeployError::io("<stdout>", e))?;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_line() {
        assert_eq!(parse_event_line(""), None);
        assert_eq!(parse_event_line("event: ping"), None);
        assert_eq!(parse_event_line("data: \u{0}"), Some(LogEvent::NoLogs));
        assert_eq!(
            parse_event_line("data: plain text"),
            Some(LogEvent::Raw("plain text".to_string()))
        );

        let event = parse_event_line(r#"data: {"source": "APP", "message": "hello"}"#);
        assert_eq!(
            event,
            Some(LogEvent::Entry(LogEntry {
                timestamp: None,
                source: Some("APP".to_string()),
                message: Some("hello".to_string()),
            }))
        );
    }

    #[test]
    fn test_format_entry_without_timestamp() {
        let entry = LogEntry {
            timestamp: None,
            source: Some("APP".to_string()),
            message: Some("started".to_string()),
        };
        assert_eq!(format_entry(&entry), "[        ] APP   : started");
    }

    #[test]
    fn test_format_entry_truncates_source() {
        let entry = LogEntry {
            timestamp: Some(1_700_000_000.5),
            source: Some("CONTAINER".to_string()),
            message: Some("x".to_string()),
        };
        let line = format_entry(&entry);
        assert!(line.contains("CONTAI: x"));
        assert_eq!(line.len(), "[00:00:00] CONTAI: x".len());
    }

    #[test]
    fn test_token_command_args() {
        assert_eq!(
            token_command_args(Some("dev"), Some("https://h")).unwrap(),
            vec!["auth", "token", "--profile", "dev"]
        );
        assert_eq!(
            token_command_args(None, Some("https://h")).unwrap(),
            vec!["auth", "token", "--host", "https://h"]
        );
        assert!(token_command_args(None, None).is_err());
        assert!(token_command_args(Some(""), None).is_err());
    }

    #[test]
    fn test_parse_token_output() {
        assert_eq!(parse_token_output(r#"{"access_token": "abc", "token_type": "Bearer"}"#), "abc");
        assert_eq!(parse_token_output("raw-token\n"), "raw-token");
    }

    #[test]
    fn test_stream_url() {
        let client = LogStreamClient::new("https://app.example.com/", "t");
        assert_eq!(client.stream_url(), "https://app.example.com/logz/stream");
    }
}
