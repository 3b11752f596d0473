//! Package index queries: canonical names, versions, runtime ranges.
//!
//! The [`PackageIndex`] trait decouples the correction path from the real
//! index (currently the PyPI JSON API). Tests use a static in-memory index.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::io::config::IndexConfig;

/// Interpreter versions the resolver knows how to base an image on, oldest
/// first. Also the universe for search ranges and the SyntaxError fallback.
pub const KNOWN_RUNTIMES: &[&str] = &[
    "2.7", "3.4", "3.5", "3.6", "3.7", "3.8", "3.9", "3.10", "3.11", "3.12",
];

/// Lowest supported runtime; the minimal fallback specification uses it.
pub const DEFAULT_RUNTIME: &str = KNOWN_RUNTIMES[0];

/// Import names whose distribution is published under a different name.
const ALIASES: &[(&str, &str)] = &[
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python"),
    ("Crypto", "pycryptodome"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("PIL", "pillow"),
    ("sklearn", "scikit-learn"),
    ("wx", "wxpython"),
    ("yaml", "pyyaml"),
];

/// Standard-library modules that must never be installed from the index.
const STDLIB: &[&str] = &[
    "abc", "argparse", "asyncio", "base64", "collections", "copy", "csv", "ctypes", "datetime",
    "decimal", "functools", "getopt", "glob", "hashlib", "heapq", "io", "itertools", "json",
    "logging", "math", "multiprocessing", "os", "pathlib", "pickle", "random", "re", "shutil",
    "socket", "sqlite3", "string", "struct", "subprocess", "sys", "tempfile", "threading", "time",
    "typing", "unittest", "urllib", "uuid", "xml",
];

pub fn is_stdlib(name: &str) -> bool {
    STDLIB.contains(&name)
}

/// PEP 503 name normalization: lowercase, runs of `-_.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_dash {
                out.push('-');
                last_dash = true;
            }
        } else {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        }
    }
    out.trim_matches('-').to_string()
}

/// Resolve an import name to its canonical distribution name without
/// touching the network: alias table first, then PEP 503 normalization.
pub fn canonical_name(name: &str) -> String {
    for (alias, distribution) in ALIASES {
        if name == *alias {
            return (*distribution).to_string();
        }
    }
    normalize_name(name)
}

/// Candidate runtimes from the known-interpreter table: `2r+1` entries
/// centered on `center`, clamped to the table (the valid subset when the
/// window overhangs either end).
pub fn known_runtime_range(center: &str, radius: u32) -> Vec<String> {
    let Some(center_idx) = KNOWN_RUNTIMES.iter().position(|v| *v == center) else {
        return Vec::new();
    };
    let radius = radius as usize;
    let lo = center_idx.saturating_sub(radius);
    let hi = (center_idx + radius).min(KNOWN_RUNTIMES.len() - 1);
    KNOWN_RUNTIMES[lo..=hi].iter().map(|v| (*v).to_string()).collect()
}

/// Next older known runtime that has not been tried yet (SyntaxError
/// fallback). Walks downward from `current`.
pub fn next_older_runtime(current: &str, tried: &[String]) -> Option<&'static str> {
    let current_idx = KNOWN_RUNTIMES.iter().position(|v| *v == current)?;
    KNOWN_RUNTIMES[..current_idx]
        .iter()
        .rev()
        .find(|candidate| !tried.iter().any(|t| t.as_str() == **candidate))
        .copied()
}

/// External package index.
pub trait PackageIndex {
    /// Resolve a module/import name to its canonical index name.
    fn canonicalize(&self, name: &str) -> Result<String>;

    /// Release versions of `name` installable under `runtime_version`,
    /// newest first.
    fn versions_for(&self, name: &str, runtime_version: &str) -> Result<Vec<String>>;

    /// Candidate runtime versions centered on `center` with the given radius.
    fn runtime_version_range(&self, center: &str, radius: u32) -> Result<Vec<String>>;
}

/// PyPI-backed index.
pub struct PyPiIndex {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl PyPiIndex {
    pub fn new(cfg: &IndexConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("build index http client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn project_json(&self, name: &str) -> Result<Value> {
        let url = format!("{}/pypi/{}/json", self.base_url, name);
        debug!(%url, "querying package index");
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("query index for {name}"))?
            .error_for_status()
            .with_context(|| format!("index rejected query for {name}"))?;
        response
            .json()
            .with_context(|| format!("parse index response for {name}"))
    }
}

impl PackageIndex for PyPiIndex {
    fn canonicalize(&self, name: &str) -> Result<String> {
        // The index itself redirects any normalized spelling, so this never
        // needs a network round-trip.
        Ok(canonical_name(name))
    }

    fn versions_for(&self, name: &str, runtime_version: &str) -> Result<Vec<String>> {
        let project = self.project_json(name)?;
        let releases = project
            .get("releases")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("index response for {name} has no releases table"))?;

        let mut versions: Vec<String> = Vec::new();
        for (version, files) in releases {
            if release_supports_runtime(files, runtime_version) {
                versions.push(version.clone());
            }
        }
        versions.sort_by(|a, b| version_key(b).cmp(&version_key(a)));
        Ok(versions)
    }

    fn runtime_version_range(&self, center: &str, radius: u32) -> Result<Vec<String>> {
        Ok(known_runtime_range(center, radius))
    }
}

/// A release supports the runtime when any of its files does (or when no
/// file states a `requires_python` constraint at all).
fn release_supports_runtime(files: &Value, runtime_version: &str) -> bool {
    let Some(files) = files.as_array() else {
        return true;
    };
    if files.is_empty() {
        return false;
    }
    files.iter().any(|file| {
        match file.get("requires_python").and_then(Value::as_str) {
            Some(constraint) => requires_python_matches(constraint, runtime_version),
            None => true,
        }
    })
}

/// Minimal `requires_python` evaluation over comma-separated specifiers.
/// Unparseable specifiers are treated as satisfied.
fn requires_python_matches(constraint: &str, runtime_version: &str) -> bool {
    let runtime = version_key(runtime_version);
    constraint.split(',').all(|spec| {
        let spec = spec.trim();
        if spec.is_empty() {
            return true;
        }
        let (op, version) = split_specifier(spec);
        let bound = version_key(version.trim_end_matches(".*"));
        if bound.is_empty() {
            return true;
        }
        let cmp = compare_prefix(&runtime, &bound);
        match op {
            ">=" => cmp != std::cmp::Ordering::Less,
            ">" => cmp == std::cmp::Ordering::Greater,
            "<=" => cmp != std::cmp::Ordering::Greater,
            "<" => cmp == std::cmp::Ordering::Less,
            "==" => cmp == std::cmp::Ordering::Equal,
            "!=" => cmp != std::cmp::Ordering::Equal,
            _ => true,
        }
    })
}

fn split_specifier(spec: &str) -> (&str, &str) {
    for op in [">=", "<=", "==", "!=", ">", "<", "~="] {
        if let Some(version) = spec.strip_prefix(op) {
            return (op, version.trim());
        }
    }
    ("", spec)
}

/// Numeric version segments for ordering; non-numeric tails are dropped.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map_while(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare against a bound, padding the shorter key with zeros.
fn compare_prefix(left: &[u64], right: &[u64]) -> std::cmp::Ordering {
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}
