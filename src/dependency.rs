//! Dependency inspection
//!
//! Classifies the server's dependency declaration as either a released
//! version from the package index or a branch of a git repository. The
//! classification is decided once here and dispatched on by the pipeline.

use crate::error::{DeployError, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Marker distinguishing a source-control requirement from an index one
pub const VCS_MARKER: &str = "git+";

/// Branch used when a git requirement names none
pub const DEFAULT_BRANCH: &str = "master";

/// Where the UI bundle comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// A released version; `pinned` is set for `==X` requirements
    Index { pinned: Option<String> },
    /// A branch of a git repository, built from source
    Branch { repo_url: String, branch: String },
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::Index { pinned: Some(v) } => write!(f, "index (pinned {})", v),
            AssetSource::Index { pinned: None } => write!(f, "index (latest release)"),
            AssetSource::Branch { repo_url, branch } => {
                write!(f, "source ({} @ {})", repo_url, branch)
            }
        }
    }
}

/// A parsed dependency line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Package name as written, `None` for a bare git URL without `#egg=`
    pub package: Option<String>,
    pub source: AssetSource,
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(\[[^\]]*\])?\s*(.*)$")
            .expect("valid regex")
    })
}

/// Normalized form used to compare package names (`My_Pkg` == `my-pkg`)
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '.' { '-' } else { c })
        .collect()
}

impl Declaration {
    /// Parses a single requirement line
    pub fn parse(line: &str) -> Result<Self> {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            return Err(DeployError::config("Empty dependency declaration"));
        }

        match line.find(VCS_MARKER) {
            Some(idx) => parse_vcs(line, idx),
            None => parse_index(line),
        }
    }
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    // A comment needs preceding whitespace; `#egg=` fragments do not have it.
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn strip_marker(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => line[..idx].trim_end(),
        None => line,
    }
}

/// The requirement behind `-e <req>`, `--editable <req>` or `--editable=<req>`
fn editable_target(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("--editable")
        .or_else(|| line.strip_prefix("-e"))?;
    let rest = rest.strip_prefix('=').unwrap_or(rest);
    if rest.len() == line.len() {
        return None;
    }
    Some(rest.trim())
}

fn parse_vcs(line: &str, marker_idx: usize) -> Result<Declaration> {
    let prefix = line[..marker_idx].trim();
    let url = strip_marker(line[marker_idx..].trim());

    let (url, fragment) = match url.split_once('#') {
        Some((u, frag)) => (u, Some(frag)),
        None => (url, None),
    };

    let package = if prefix.is_empty() {
        fragment.and_then(egg_name)
    } else {
        let name = prefix.strip_suffix('@').map(str::trim).ok_or_else(|| {
            DeployError::config(format!(
                "Malformed git requirement '{}': expected '<name> @ git+<url>'",
                line
            ))
        })?;
        Some(validate_name(name, line)?)
    };

    let repo = &url[VCS_MARKER.len()..];
    let (repo_url, branch) = split_branch(repo, line)?;

    Ok(Declaration {
        package,
        source: AssetSource::Branch { repo_url, branch },
    })
}

fn egg_name(fragment: &str) -> Option<String> {
    fragment
        .split('&')
        .find_map(|kv| kv.strip_prefix("egg="))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Splits `https://host/org/repo.git@branch` on the last `@` in the path.
/// An `@` in the authority (`ssh://git@host/...`) is a user, not a branch.
fn split_branch(repo: &str, line: &str) -> Result<(String, String)> {
    let scheme_end = repo.find("://").ok_or_else(|| {
        DeployError::config(format!(
            "Malformed git requirement '{}': URL has no scheme",
            line
        ))
    })?;
    let after_scheme = scheme_end + 3;
    let path_start = repo[after_scheme..]
        .find('/')
        .map(|i| after_scheme + i)
        .ok_or_else(|| {
            DeployError::config(format!(
                "Malformed git requirement '{}': URL has no repository path",
                line
            ))
        })?;

    let authority = &repo[after_scheme..path_start];
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    if host.is_empty() {
        return Err(DeployError::config(format!(
            "Malformed git requirement '{}': URL has no host",
            line
        )));
    }

    let (repo_url, branch) = match repo[path_start..].rfind('@') {
        Some(rel) => {
            let at = path_start + rel;
            let branch = repo[at + 1..].trim();
            if branch.is_empty() {
                return Err(DeployError::config(format!(
                    "Malformed git requirement '{}': empty branch after '@'",
                    line
                )));
            }
            (repo[..at].to_string(), branch.to_string())
        }
        None => (repo.to_string(), DEFAULT_BRANCH.to_string()),
    };

    if repo_url.len() <= path_start + 1 {
        return Err(DeployError::config(format!(
            "Malformed git requirement '{}': URL has no repository path",
            line
        )));
    }

    Ok((repo_url, branch))
}

fn validate_name(name: &str, line: &str) -> Result<String> {
    let caps = name_regex().captures(name).ok_or_else(|| {
        DeployError::config(format!("Invalid package name in '{}'", line))
    })?;
    let rest = caps.get(3).map_or("", |m| m.as_str());
    if !rest.is_empty() {
        return Err(DeployError::config(format!(
            "Invalid package name in '{}'",
            line
        )));
    }
    Ok(caps[1].to_string())
}

fn parse_index(line: &str) -> Result<Declaration> {
    let line = strip_marker(line);
    let caps = name_regex().captures(line).ok_or_else(|| {
        DeployError::config(format!("Malformed dependency declaration '{}'", line))
    })?;

    let package = caps[1].to_string();
    let spec = caps.get(3).map_or("", |m| m.as_str()).trim();

    if spec.starts_with('@') {
        return Err(DeployError::config(format!(
            "Unsupported direct reference '{}': only {} URLs are supported",
            line, VCS_MARKER
        )));
    }

    let spec = spec
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(spec)
        .trim();

    let mut pinned = None;
    if !spec.is_empty() {
        let clauses: Vec<&str> = spec.split(',').map(str::trim).collect();
        for clause in &clauses {
            if !is_version_clause(clause) {
                return Err(DeployError::config(format!(
                    "Malformed version specifier '{}' in '{}'",
                    clause, line
                )));
            }
        }
        if let [only] = clauses.as_slice() {
            if let Some(version) = only.strip_prefix("==") {
                let version = version.trim_start_matches('=').trim();
                if !version.contains('*') {
                    pinned = Some(version.to_string());
                }
            }
        }
    }

    Ok(Declaration {
        package: Some(package),
        source: AssetSource::Index { pinned },
    })
}

fn is_version_clause(clause: &str) -> bool {
    const OPERATORS: [&str; 8] = ["===", "==", "!=", "~=", ">=", "<=", ">", "<"];
    OPERATORS.iter().any(|op| {
        clause
            .strip_prefix(op)
            .map(|v| {
                let v = v.trim();
                !v.is_empty()
                    && v
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '*' | '+' | '!' | '-' | '_'))
            })
            .unwrap_or(false)
    })
}

/// Finds and parses the declaration for `package` in a requirements manifest
pub fn find_declaration(manifest: &str, package: &str) -> Result<Declaration> {
    let wanted = normalize_name(package);

    for (lineno, raw) in manifest.lines().enumerate() {
        let line = strip_comment(raw).trim();
        let line = match editable_target(line) {
            Some(target) if target.contains(VCS_MARKER) => target,
            // Local editable installs and other pip options
            _ if line.starts_with('-') => continue,
            _ => line,
        };
        if line.is_empty() {
            continue;
        }

        let decl = Declaration::parse(line).map_err(|e| match e {
            DeployError::Configuration(msg) => {
                DeployError::config(format!("line {}: {}", lineno + 1, msg))
            }
            other => other,
        })?;

        if decl.package.as_deref().map(normalize_name).as_deref() == Some(wanted.as_str()) {
            return Ok(decl);
        }
    }

    Err(DeployError::config(format!(
        "No declaration for package '{}' found in manifest",
        package
    )))
}

/// Reads `path` and finds the declaration for `package`
pub fn inspect_manifest(path: &Path, package: &str) -> Result<AssetSource> {
    let content = fs::read_to_string(path).map_err(|e| {
        DeployError::config(format!(
            "Failed to read dependency manifest {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(find_declaration(&content, package)?.source)
}
