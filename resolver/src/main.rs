//! Container-based dependency repair resolver.
//!
//! Takes a dependency-broken Python snippet and searches for a runtime
//! version plus package pins under which it runs inside a fresh container.
//! Candidates run as independent worker processes; each writes an
//! append-only iteration log next to the snippet as its artifact of record.

use std::io::Read as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use resolver::core::env_spec::EnvSpec;
use resolver::exit_codes;
use resolver::interactive::ConsoleSession;
use resolver::io::config::{ResolverConfig, load_config};
use resolver::io::container::{DockerCli, SourcePaths};
use resolver::io::index::{self, PackageIndex, PyPiIndex};
use resolver::io::suggest::{OllamaCli, SeedSuggestion, Suggester};
use resolver::looping::{LoopRequest, run_resolution};
use resolver::search::{CandidateStatus, WorkerLauncher, candidate_versions, run_search};

#[derive(Parser)]
#[command(
    name = "resolver",
    version,
    about = "Container-based dependency repair loop for broken Python snippets"
)]
struct Cli {
    /// Path to the Python file to repair.
    #[arg(short, long)]
    file: PathBuf,

    /// Base URL of the model endpoint, passed to the suggestion service.
    #[arg(short = 'b', long, default_value = "http://localhost:11434")]
    endpoint: String,

    /// Model used for evaluation and replacement suggestions.
    #[arg(short, long, default_value = "phi3:medium")]
    model: String,

    /// Retry budget per resolution loop.
    #[arg(short = 'l', long = "loop", default_value_t = 5)]
    loop_budget: u32,

    /// Search radius above and below the suggested runtime version.
    #[arg(short, long, default_value_t = 0)]
    range: u32,

    /// Pause after each failed attempt and accept operator patches.
    #[arg(short, long)]
    interactive: bool,

    /// Internal: run one resolution loop for this runtime version, reading
    /// the seed specification as JSON on stdin.
    #[arg(long, hide = true)]
    candidate: Option<String>,
}

fn main() {
    resolver::logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::INTERNAL);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let source = SourcePaths::from_file(&cli.file)?;
    let config = load_config(&source.project_dir.join("resolver.toml"))?;
    let suggester = OllamaCli::new(&cli.endpoint, &cli.model, &config);
    let index = PyPiIndex::new(&config.index)?;

    if let Some(version) = cli.candidate.clone() {
        return run_worker(&cli, &config, &source, &suggester, &index, &version);
    }

    let seed = seed_spec(&cli, &config, &suggester, &index)?;
    info!(
        runtime = %seed.runtime_version,
        packages = seed.packages.len(),
        "seed specification ready"
    );

    if cli.interactive {
        return run_interactive(&cli, &config, &source, &suggester, &index, seed);
    }

    let candidates = candidate_versions(&index, &seed.runtime_version, cli.range);
    println!("searching runtime versions: {}", candidates.join(", "));
    let launcher = WorkerLauncher {
        file: cli.file.clone(),
        endpoint: cli.endpoint.clone(),
        model: cli.model.clone(),
        budget: cli.loop_budget,
    };
    let outcomes = run_search(
        &launcher,
        &seed,
        &candidates,
        Duration::from_secs(config.candidate_timeout_secs),
    )?;

    for outcome in &outcomes {
        match &outcome.status {
            CandidateStatus::Completed { exit_code } => println!(
                "runtime {}: completed (exit {})",
                outcome.runtime_version,
                exit_code.map_or_else(|| "killed".to_string(), |code| code.to_string())
            ),
            CandidateStatus::TimedOut => {
                println!("runtime {}: timed out", outcome.runtime_version);
            }
        }
    }
    Ok(())
}

/// Worker mode: one resolution loop for one candidate version, seed on stdin.
fn run_worker<S: Suggester, I: PackageIndex>(
    cli: &Cli,
    config: &ResolverConfig,
    source: &SourcePaths,
    suggester: &S,
    index: &I,
    version: &str,
) -> Result<()> {
    let mut payload = String::new();
    std::io::stdin()
        .read_to_string(&mut payload)
        .context("read seed spec from stdin")?;
    let mut spec: EnvSpec =
        serde_json::from_str(&payload).context("parse seed spec from stdin")?;
    spec.runtime_version = version.to_string();

    let mut container = DockerCli::new(config);
    let request = LoopRequest {
        source,
        log_path: source
            .project_dir
            .join(format!("output_data_{version}.yml")),
        budget: cli.loop_budget,
    };

    let outcome = run_resolution(&request, &mut container, suggester, index, &mut spec, None)?;
    // Budget exhaustion is a handled outcome: the log says what happened.
    info!(stop = ?outcome.stop, attempts = outcome.attempts, "worker finished");
    Ok(())
}

/// Interactive mode: exactly one candidate, operator in the loop.
fn run_interactive<S: Suggester, I: PackageIndex>(
    cli: &Cli,
    config: &ResolverConfig,
    source: &SourcePaths,
    suggester: &S,
    index: &I,
    mut spec: EnvSpec,
) -> Result<()> {
    let candidates = candidate_versions(index, &spec.runtime_version, cli.range);
    spec.runtime_version = candidates[0].clone();

    let mut container = DockerCli::new(config);
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut session = ConsoleSession::new(suggester, index, stdin.lock(), stdout);
    let request = LoopRequest {
        source,
        log_path: source.project_dir.join("output_data_interactive.yml"),
        budget: cli.loop_budget,
    };

    let outcome = run_resolution(
        &request,
        &mut container,
        suggester,
        index,
        &mut spec,
        Some(&mut session),
    )?;
    println!(
        "session finished after {} attempt(s): {:?}",
        outcome.attempts, outcome.stop
    );
    Ok(())
}

/// Initial guess with bounded retries; a suggestion service that never
/// produces a usable seed falls back to the minimal default specification so
/// the search always has something to attempt.
fn seed_spec<S: Suggester, I: PackageIndex>(
    cli: &Cli,
    config: &ResolverConfig,
    suggester: &S,
    index: &I,
) -> Result<EnvSpec> {
    let retries = config.suggest_retries.max(1);
    for attempt in 1..=retries {
        match suggester.evaluate_source(&cli.file) {
            Ok(seed) => return build_seed_spec(seed, index),
            Err(err) => {
                warn!(attempt, retries, err = %err, "seed evaluation failed");
            }
        }
    }
    warn!("falling back to the minimal default specification");
    Ok(EnvSpec::new(index::DEFAULT_RUNTIME))
}

fn build_seed_spec<I: PackageIndex>(seed: SeedSuggestion, index: &I) -> Result<EnvSpec> {
    let mut spec = EnvSpec::new(seed.runtime_version);
    for raw in &seed.packages {
        // Standard-library modules must never be installed from the index.
        if index::is_stdlib(raw) {
            continue;
        }
        let name = index.canonicalize(raw)?;
        if spec.packages.contains(&name) {
            continue;
        }
        let version = match index.versions_for(&name, &spec.runtime_version) {
            Ok(versions) => versions.into_iter().next(),
            Err(err) => {
                warn!(package = %name, err = %err, "index query failed; leaving unpinned");
                None
            }
        };
        spec.packages.pin(&name, version);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resolver::test_support::StaticIndex;

    #[test]
    fn parse_defaults() {
        let cli = Cli::parse_from(["resolver", "--file", "snippet.py"]);
        assert_eq!(cli.loop_budget, 5);
        assert_eq!(cli.range, 0);
        assert!(!cli.interactive);
        assert_eq!(cli.candidate, None);
    }

    #[test]
    fn parse_loop_and_range_and_candidate() {
        let cli = Cli::parse_from([
            "resolver",
            "--file",
            "snippet.py",
            "--loop",
            "7",
            "--range",
            "2",
            "--candidate",
            "3.8",
        ]);
        assert_eq!(cli.loop_budget, 7);
        assert_eq!(cli.range, 2);
        assert_eq!(cli.candidate.as_deref(), Some("3.8"));
    }

    #[test]
    fn seed_spec_skips_stdlib_and_pins_newest_versions() {
        let index = StaticIndex::with_versions(&[("pillow", &["9.0.0", "8.4.0"])]);
        let seed = SeedSuggestion {
            runtime_version: "3.9".to_string(),
            packages: vec![
                "sys".to_string(),
                "PIL".to_string(),
                "requests".to_string(),
            ],
        };

        let spec = build_seed_spec(seed, &index).expect("seed spec");
        assert_eq!(spec.runtime_version, "3.9");
        assert!(!spec.packages.contains("sys"));
        assert_eq!(
            spec.packages.get("pillow").expect("entry").version.as_deref(),
            Some("9.0.0")
        );
        // Unknown to the index: kept, but unpinned.
        assert_eq!(spec.packages.get("requests").expect("entry").version, None);
    }
}
