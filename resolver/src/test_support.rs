//! Scripted collaborator fakes for loop and correction tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::env_spec::EnvSpec;
use crate::io::container::{BuildOutput, ContainerRunner, RunOutput, SourcePaths};
use crate::io::index::{PackageIndex, canonical_name, known_runtime_range};
use crate::io::suggest::{ReplacementRequest, SeedSuggestion, Suggester};

/// One scripted build/run attempt.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    /// Build fails with this log.
    BuildFails { log: String },
    /// Build succeeds; the run returns this log and exit signal.
    Runs { log: String, exited_nonzero: bool },
    /// The engine itself is unreachable for this attempt.
    EngineDown { message: String },
}

/// Container runner that replays a fixed script of attempts.
#[derive(Debug, Default)]
pub struct ScriptedContainer {
    attempts: VecDeque<ScriptedAttempt>,
    pending_run: Option<(String, bool)>,
    /// Specifications observed by `build`, in call order.
    pub built_specs: Vec<EnvSpec>,
    pub removed_containers: u32,
    pub removed_images: u32,
}

impl ScriptedContainer {
    pub fn new(attempts: Vec<ScriptedAttempt>) -> Self {
        Self {
            attempts: attempts.into(),
            ..Self::default()
        }
    }
}

impl ContainerRunner for ScriptedContainer {
    fn build(&mut self, spec: &EnvSpec, _source: &SourcePaths) -> Result<BuildOutput> {
        self.built_specs.push(spec.clone());
        match self.attempts.pop_front() {
            Some(ScriptedAttempt::BuildFails { log }) => Ok(BuildOutput { ok: false, log }),
            Some(ScriptedAttempt::Runs {
                log,
                exited_nonzero,
            }) => {
                self.pending_run = Some((log, exited_nonzero));
                Ok(BuildOutput {
                    ok: true,
                    log: String::new(),
                })
            }
            Some(ScriptedAttempt::EngineDown { message }) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted container ran out of attempts")),
        }
    }

    fn run(&mut self) -> Result<RunOutput> {
        let (log, exited_nonzero) = self
            .pending_run
            .take()
            .ok_or_else(|| anyhow!("run called without a successful build"))?;
        Ok(RunOutput {
            log,
            exited_nonzero,
        })
    }

    fn remove_container(&mut self) -> Result<()> {
        self.removed_containers += 1;
        Ok(())
    }

    fn remove_image(&mut self) -> Result<()> {
        self.removed_images += 1;
        Ok(())
    }
}

/// Suggester that replays scripted replacement versions.
#[derive(Debug, Default)]
pub struct ScriptedSuggester {
    replacements: RefCell<VecDeque<Option<String>>>,
    seed: Option<SeedSuggestion>,
    diagnosis: String,
    /// Packages the loop asked replacements for, in call order.
    pub asked: RefCell<Vec<String>>,
}

impl ScriptedSuggester {
    pub fn with_replacements(replacements: Vec<Option<String>>) -> Self {
        Self {
            replacements: RefCell::new(replacements.into()),
            ..Self::default()
        }
    }

    pub fn with_seed(seed: SeedSuggestion) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn with_diagnosis(diagnosis: &str) -> Self {
        Self {
            diagnosis: diagnosis.to_string(),
            ..Self::default()
        }
    }
}

impl Suggester for ScriptedSuggester {
    fn evaluate_source(&self, _file: &Path) -> Result<SeedSuggestion> {
        self.seed
            .clone()
            .ok_or_else(|| anyhow!("scripted suggester has no seed"))
    }

    fn suggest_replacement(&self, request: &ReplacementRequest<'_>) -> Result<Option<String>> {
        self.asked.borrow_mut().push(request.package.to_string());
        // An exhausted script means "no replacement", matching a model that
        // has given up on the package.
        Ok(self.replacements.borrow_mut().pop_front().flatten())
    }

    fn summarize_failure(&self, _log: &str) -> Result<String> {
        Ok(self.diagnosis.clone())
    }
}

/// In-memory package index with the static runtime table.
#[derive(Debug, Default)]
pub struct StaticIndex {
    versions: BTreeMap<String, Vec<String>>,
}

impl StaticIndex {
    pub fn with_versions(entries: &[(&str, &[&str])]) -> Self {
        let versions = entries
            .iter()
            .map(|(name, versions)| {
                (
                    (*name).to_string(),
                    versions.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect();
        Self { versions }
    }
}

impl PackageIndex for StaticIndex {
    fn canonicalize(&self, name: &str) -> Result<String> {
        Ok(canonical_name(name))
    }

    fn versions_for(&self, name: &str, _runtime_version: &str) -> Result<Vec<String>> {
        Ok(self.versions.get(name).cloned().unwrap_or_default())
    }

    fn runtime_version_range(&self, center: &str, radius: u32) -> Result<Vec<String>> {
        Ok(known_runtime_range(center, radius))
    }
}

/// Temporary project directory holding one snippet file.
pub struct TestProject {
    _dir: tempfile::TempDir,
    pub source: SourcePaths,
    pub snippet_path: PathBuf,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let snippet_path = dir.path().join("snippet.py");
        std::fs::write(&snippet_path, "import requests\nprint('hi')\n")?;
        let source = SourcePaths::from_file(&snippet_path)?;
        Ok(Self {
            _dir: dir,
            source,
            snippet_path,
        })
    }

    pub fn log_path(&self, runtime_version: &str) -> PathBuf {
        self.source
            .project_dir
            .join(format!("output_data_{runtime_version}.yml"))
    }
}
