//! Resolver configuration stored next to the target file (`resolver.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Resolver configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Wall-clock ceiling for one candidate's resolution loop, in seconds.
    pub candidate_timeout_secs: u64,

    /// Timeout for a single container build, in seconds.
    pub build_timeout_secs: u64,

    /// Timeout for a single container run, in seconds.
    pub run_timeout_secs: u64,

    /// Timeout for one suggestion-service call, in seconds.
    pub suggest_timeout_secs: u64,

    /// Truncate captured build/run output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Bounded retries for malformed suggestion-service replies.
    pub suggest_retries: u32,

    pub index: IndexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the package index JSON API.
    pub base_url: String,

    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pypi.org".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            candidate_timeout_secs: 20 * 60,
            build_timeout_secs: 15 * 60,
            run_timeout_secs: 10 * 60,
            suggest_timeout_secs: 120,
            output_limit_bytes: 100_000,
            suggest_retries: 5,
            index: IndexConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.candidate_timeout_secs == 0 {
            return Err(anyhow!("candidate_timeout_secs must be > 0"));
        }
        if self.build_timeout_secs == 0 {
            return Err(anyhow!("build_timeout_secs must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.suggest_timeout_secs == 0 {
            return Err(anyhow!("suggest_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.index.base_url.trim().is_empty() {
            return Err(anyhow!("index.base_url must be non-empty"));
        }
        if self.index.request_timeout_secs == 0 {
            return Err(anyhow!("index.request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ResolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<ResolverConfig> {
    if !path.exists() {
        let cfg = ResolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ResolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ResolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ResolverConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("resolver.toml");
        let cfg = ResolverConfig {
            candidate_timeout_secs: 60,
            ..ResolverConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let cfg = ResolverConfig {
            candidate_timeout_secs: 0,
            ..ResolverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
