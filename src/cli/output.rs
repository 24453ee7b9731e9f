//! Output formatting for command results
//!
//! Human-readable text for operators, JSON for scripts wrapping the harness.

use anyhow::{Context, Result};
use serde_json::json;

use crate::dependency::AssetSource;
use crate::pipeline::StageReport;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the classified dependency
    pub fn format_source(&self, source: &AssetSource) -> Result<String> {
        match self.format {
            OutputFormat::Json => pretty(&source_json(source)),
            OutputFormat::Human => Ok(self.format_source_human(source)),
        }
    }

    /// Formats the outcome of a successful `stage`
    pub fn format_report(&self, report: &StageReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_report_json(report),
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    fn format_source_human(&self, source: &AssetSource) -> String {
        match source {
            AssetSource::Index { pinned } => format!(
                "Asset source: package index\n  Version: {}\n",
                pinned.as_deref().unwrap_or("latest release")
            ),
            AssetSource::Branch { repo_url, branch } => format!(
                "Asset source: build from source\n  Repository: {}\n  Branch: {}\n",
                repo_url, branch
            ),
        }
    }

    fn format_report_json(&self, report: &StageReport) -> Result<String> {
        let oversized: Vec<_> = report
            .normalize
            .oversized
            .iter()
            .map(|(path, size)| json!({ "path": path, "bytes": size }))
            .collect();

        pretty(&json!({
            "source": source_json(&report.source),
            "version": report.version,
            "staged_at": report.staged_at,
            "files": report.files,
            "removed_debug_maps": report.normalize.removed,
            "oversized": oversized,
        }))
    }

    fn format_report_human(&self, report: &StageReport) -> String {
        let mut output = String::new();
        output.push_str(&format!("Staged UI assets at {}\n", report.staged_at.display()));
        output.push_str(&format!("  Source: {}\n", report.source));
        if let Some(version) = &report.version {
            output.push_str(&format!("  Version: {}\n", version));
        }
        output.push_str(&format!("  Files: {}\n", report.files));
        output.push_str(&format!(
            "  Debug maps removed: {}\n",
            report.normalize.removed
        ));

        if !report.normalize.oversized.is_empty() {
            output.push_str("\nWarnings:\n");
            for (path, size) in &report.normalize.oversized {
                output.push_str(&format!(
                    "  ⚠ {} is {} bytes, above the hosting per-file limit\n",
                    path.display(),
                    size
                ));
            }
        }

        output
    }
}

fn source_json(source: &AssetSource) -> serde_json::Value {
    match source {
        AssetSource::Index { pinned } => json!({ "kind": "index", "pinned": pinned }),
        AssetSource::Branch { repo_url, branch } => {
            json!({ "kind": "branch", "repo_url": repo_url, "branch": branch })
        }
    }
}

fn pretty(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")
}
