//! Release listing for the `versions` command
//!
//! Versions follow a subset of PEP 440: numeric release segments with optional
//! pre (`a`, `b`, `rc`), post and dev suffixes.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// A parsed release version; unparseable strings sort lowest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
    raw: String,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

fn suffix_regex() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        Regex::new(
            r"^(?:[-_.]?(a|alpha|b|beta|rc|c|pre|preview)[-_.]?(\d*))?(?:[-_.]?(post|rev|r)[-_.]?(\d*))?(?:[-_.]?dev[-_.]?(\d*))?$",
        )
        .expect("valid regex")
    })
}

impl ReleaseVersion {
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let text = lowered.strip_prefix('v').unwrap_or(&lowered);

        let release_end = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let release_str = text[..release_end].trim_end_matches('.');
        let release: Vec<u64> = release_str
            .split('.')
            .filter_map(|s| s.parse::<u64>().ok())
            .collect();

        let mut version = Self {
            raw: raw.to_string(),
            release,
            pre: None,
            post: None,
            dev: None,
        };

        let suffix = &text[release_str.len()..];
        let Some(caps) = suffix_regex().captures(suffix) else {
            version.release.clear();
            return version;
        };

        let num = |i: usize| {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
        };

        version.pre = caps.get(1).map(|kind| {
            let kind = match kind.as_str() {
                "a" | "alpha" => PreKind::Alpha,
                "b" | "beta" => PreKind::Beta,
                _ => PreKind::Rc,
            };
            (kind, num(2).unwrap_or(0))
        });
        version.post = caps.get(3).map(|_| num(4).unwrap_or(0));
        // A bare `dev` still captures group 5 as an empty string
        version.dev = num(5);

        version
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn major(&self) -> Option<u64> {
        self.release.first().copied()
    }

    pub fn minor(&self) -> u64 {
        self.release.get(1).copied().unwrap_or(0)
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn phase(&self) -> i8 {
        if self.pre.is_some() {
            0
        } else if self.dev.is_some() && self.post.is_none() {
            -1
        } else {
            1
        }
    }
}

fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_release(&self.release, &other.release)
            .then_with(|| self.phase().cmp(&other.phase()))
            .then_with(|| self.pre.cmp(&other.pre))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| {
                self.dev
                    .unwrap_or(u64::MAX)
                    .cmp(&other.dev.unwrap_or(u64::MAX))
            })
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts version strings newest first
pub fn sort_descending(versions: &[String]) -> Vec<ReleaseVersion> {
    let mut parsed: Vec<_> = versions.iter().map(|v| ReleaseVersion::parse(v)).collect();
    parsed.sort_by(|a, b| b.cmp(a));
    parsed
}

#[derive(Debug, Serialize)]
pub struct VersionListing {
    pub latest: String,
    pub total_versions: usize,
    pub versions: Vec<String>,
}

pub fn listing(latest: &str, versions: &[String]) -> VersionListing {
    let sorted = sort_descending(versions);
    VersionListing {
        latest: latest.to_string(),
        total_versions: sorted.len(),
        versions: sorted.iter().map(|v| v.as_str().to_string()).collect(),
    }
}

/// Human-readable listing: the latest major in detail, older majors compactly
pub fn render_human(package: &str, latest: &str, versions: &[String]) -> String {
    let sorted = sort_descending(versions);
    let latest_major = ReleaseVersion::parse(latest).major().unwrap_or(0);
    let mut out = String::new();

    let _ = writeln!(out, "{} Versions (latest: {})", package, latest);
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out, "\n▼ Version {}.x (current):", latest_major);

    // (major, minor) descending, preserving newest-first order within a group
    let mut current: BTreeMap<std::cmp::Reverse<u64>, Vec<&ReleaseVersion>> = BTreeMap::new();
    let mut older: BTreeMap<std::cmp::Reverse<u64>, Vec<&ReleaseVersion>> = BTreeMap::new();
    for v in &sorted {
        let Some(major) = v.major() else { continue };
        if major == latest_major {
            current.entry(std::cmp::Reverse(v.minor())).or_default().push(v);
        } else {
            older.entry(std::cmp::Reverse(major)).or_default().push(v);
        }
    }

    for (minor, group) in &current {
        let _ = writeln!(out, "\n  {}.{}.x:", latest_major, minor.0);
        let (pre, stable): (Vec<&&ReleaseVersion>, Vec<&&ReleaseVersion>) =
            group.iter().partition(|v| v.is_prerelease());
        for v in &stable {
            let marker = if v.as_str() == latest { "→" } else { "•" };
            let _ = writeln!(out, "    {} {}", marker, v.as_str());
        }
        if !pre.is_empty() {
            let names: Vec<_> = pre.iter().map(|v| v.as_str()).collect();
            let _ = writeln!(out, "    • {} pre-release: {}", pre.len(), names.join(", "));
        }
    }

    if !older.is_empty() {
        let _ = writeln!(out, "\n▼ Older versions:");
        for (major, group) in &older {
            let stable: Vec<_> = group.iter().filter(|v| !v.is_prerelease()).collect();
            let (newest, oldest) = match (stable.first(), stable.last()) {
                (Some(n), Some(o)) => (n.as_str(), o.as_str()),
                _ => (group[0].as_str(), group[group.len() - 1].as_str()),
            };
            let _ = writeln!(
                out,
                "  {}.x: {} → {} ({} total)",
                major.0,
                newest,
                oldest,
                group.len()
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prerelease_orders_before_final() {
        let rc = ReleaseVersion::parse("3.3.0rc0");
        let final_ = ReleaseVersion::parse("3.3.0");
        let dev = ReleaseVersion::parse("3.3.0.dev0");
        let post = ReleaseVersion::parse("3.3.0.post1");
        assert!(dev < rc);
        assert!(rc < final_);
        assert!(final_ < post);
        assert!(rc.is_prerelease());
        assert!(dev.is_prerelease());
        assert!(!post.is_prerelease());
    }

    #[test]
    fn test_numeric_ordering() {
        let sorted = sort_descending(&strings(&["2.9.0", "2.10.0", "10.0", "2.9"]));
        let names: Vec<_> = sorted.iter().map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["10.0", "2.10.0", "2.9.0", "2.9"]);
    }

    #[test]
    fn test_listing_json() {
        let listing = listing("3.3.1", &strings(&["3.3.0", "3.3.1", "2.22.0"]));
        assert_eq!(listing.total_versions, 3);
        assert_eq!(listing.versions[0], "3.3.1");
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["latest"], "3.3.1");
    }

    #[test]
    fn test_render_human() {
        let out = render_human(
            "mlflow",
            "3.3.1",
            &strings(&["3.3.1", "3.3.0", "3.3.0rc0", "3.2.0", "2.22.0", "2.0.0", "2.0.0rc1", "1.30.1"]),
        );
        assert!(out.contains("mlflow Versions (latest: 3.3.1)"));
        assert!(out.contains("→ 3.3.1"));
        assert!(out.contains("• 1 pre-release: 3.3.0rc0"));
        assert!(out.contains("  3.2.x:"));
        assert!(out.contains("2.x: 2.22.0 → 2.0.0 (3 total)"));
        assert!(out.contains("1.x: 1.30.1 → 1.30.1 (1 total)"));
        assert!(out.find("3.3.x").unwrap() < out.find("3.2.x").unwrap());
    }
}
