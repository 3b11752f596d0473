//! Suggestion service: seed evaluation, replacement versions, diagnoses.
//!
//! The [`Suggester`] trait decouples the resolution loop from the model
//! backend (currently `ollama run` against a local endpoint). Tests use
//! scripted suggesters that return predetermined answers without spawning
//! processes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::io::config::ResolverConfig;
use crate::io::process::run_captured;

const EVALUATE_TEMPLATE: &str = include_str!("prompts/evaluate.md");
const REPLACEMENT_TEMPLATE: &str = include_str!("prompts/replacement.md");
const DIAGNOSE_TEMPLATE: &str = include_str!("prompts/diagnose.md");

/// Bound on the log tail included in prompts.
const LOG_TAIL_BYTES: usize = 4_000;

/// Initial guess produced from the target source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSuggestion {
    pub runtime_version: String,
    pub packages: Vec<String>,
}

/// Context handed to [`Suggester::suggest_replacement`].
#[derive(Debug, Clone, Copy)]
pub struct ReplacementRequest<'a> {
    pub package: &'a str,
    pub failing_version: Option<&'a str>,
    pub runtime_version: &'a str,
    pub failed_versions: &'a [String],
    pub log: &'a str,
}

/// External model collaborator.
pub trait Suggester {
    /// Evaluate the target file and propose an initial runtime + packages.
    fn evaluate_source(&self, file: &Path) -> Result<SeedSuggestion>;

    /// Propose a replacement version for a failing package; `None` means
    /// "give up on this package".
    fn suggest_replacement(&self, request: &ReplacementRequest<'_>) -> Result<Option<String>>;

    /// One-line diagnosis of a failure log (interactive mode only).
    fn summarize_failure(&self, log: &str) -> Result<String>;
}

/// Suggester that spawns `ollama run`.
pub struct OllamaCli {
    endpoint: String,
    model: String,
    timeout: Duration,
    output_limit_bytes: usize,
    templates: Environment<'static>,
}

impl OllamaCli {
    pub fn new(endpoint: &str, model: &str, cfg: &ResolverConfig) -> Self {
        let mut templates = Environment::new();
        templates
            .add_template("evaluate", EVALUATE_TEMPLATE)
            .expect("evaluate template should be valid");
        templates
            .add_template("replacement", REPLACEMENT_TEMPLATE)
            .expect("replacement template should be valid");
        templates
            .add_template("diagnose", DIAGNOSE_TEMPLATE)
            .expect("diagnose template should be valid");
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(cfg.suggest_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            templates,
        }
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn ask(&self, prompt: &str) -> Result<String> {
        let mut cmd = std::process::Command::new("ollama");
        cmd.arg("run")
            .arg(&self.model)
            .env("OLLAMA_HOST", &self.endpoint);

        let output = run_captured(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run ollama")?;
        if !output.success() {
            return Err(anyhow!(
                "ollama run failed with status {:?}",
                output.status.code()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Suggester for OllamaCli {
    fn evaluate_source(&self, file: &Path) -> Result<SeedSuggestion> {
        let source = fs::read_to_string(file)
            .with_context(|| format!("read source file {}", file.display()))?;
        let prompt = self
            .templates
            .get_template("evaluate")?
            .render(context! { source })?;
        let reply = self.ask(&prompt)?;
        parse_seed(&reply)
    }

    fn suggest_replacement(&self, request: &ReplacementRequest<'_>) -> Result<Option<String>> {
        let prompt = self.templates.get_template("replacement")?.render(context! {
            package => request.package,
            failing_version => request.failing_version,
            runtime_version => request.runtime_version,
            failed_versions => request.failed_versions.join(", "),
            log => tail(request.log, LOG_TAIL_BYTES),
        })?;
        let reply = self.ask(&prompt)?;
        Ok(parse_replacement(&reply))
    }

    fn summarize_failure(&self, log: &str) -> Result<String> {
        let prompt = self
            .templates
            .get_template("diagnose")?
            .render(context! { log => tail(log, LOG_TAIL_BYTES) })?;
        let reply = self.ask(&prompt)?;
        reply
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("empty diagnosis from model"))
    }
}

/// Last `max` bytes of `log`, on a char boundary.
pub fn tail(log: &str, max: usize) -> &str {
    if log.len() <= max {
        return log;
    }
    let mut start = log.len() - max;
    while !log.is_char_boundary(start) {
        start += 1;
    }
    &log[start..]
}

/// Parse the model's seed reply. Models decorate JSON with prose, so this
/// extracts the outermost object before parsing, and tolerates a numeric
/// runtime version or a packages map instead of a list.
fn parse_seed(reply: &str) -> Result<SeedSuggestion> {
    let value = extract_json_object(reply)
        .ok_or_else(|| anyhow!("no JSON object in model reply"))?;

    let runtime_version = match value.get("runtime_version") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(anyhow!("model reply missing runtime_version")),
    };

    let packages = match value.get("packages") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        // Some models answer with {"name": "version"} instead of a list.
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!(?other, "unexpected packages shape in model reply");
            Vec::new()
        }
    };

    debug!(%runtime_version, package_count = packages.len(), "parsed seed suggestion");
    Ok(SeedSuggestion {
        runtime_version,
        packages,
    })
}

/// Parse a replacement reply: a `{"version": ...}` object, or a bare token.
fn parse_replacement(reply: &str) -> Option<String> {
    if let Some(value) = extract_json_object(reply) {
        return match value.get("version") {
            Some(Value::String(s)) => normalize_version_token(s),
            _ => None,
        };
    }
    reply
        .split_whitespace()
        .next()
        .and_then(normalize_version_token)
}

fn normalize_version_token(raw: &str) -> Option<String> {
    let token = raw.trim().trim_matches(|c| matches!(c, '"' | '\'' | '`'));
    if token.is_empty() || token.eq_ignore_ascii_case("none") || token.eq_ignore_ascii_case("null")
    {
        return None;
    }
    Some(token.to_string())
}

fn extract_json_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}
