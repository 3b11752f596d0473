//! Append-only per-candidate iteration log: the artifact of record.
//!
//! Each record is written open-append-close so a killed loop leaves a valid,
//! truncated-but-parseable document. The recorder is also the single
//! authoritative place where the retry budget is enforced; the resolution
//! loop must not duplicate the check.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::env_spec::PackageSet;
use crate::core::types::ErrorKind;

/// One persisted attempt.
#[derive(Debug, Clone)]
pub struct IterationRecord<'a> {
    /// 1-based attempt number within the loop.
    pub index: u32,
    /// Packages as the failed attempt actually installed them.
    pub packages: &'a PackageSet,
    pub error_kind: ErrorKind,
    /// Sanitized error text (see `core::sanitize`).
    pub error: &'a str,
}

/// Why the recorder finalized the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Succeeded,
    BudgetExhausted,
}

/// Verdict returned by [`IterationRecorder::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderVerdict {
    /// Budget remains; the loop may attempt again.
    Continue,
    /// The log has been finalized; the loop must stop and tear down.
    Finalized(StopCause),
}

pub struct IterationRecorder {
    path: PathBuf,
    budget: u32,
    started: Instant,
    next_index: u32,
    finalized: bool,
}

impl IterationRecorder {
    /// Open the log and write its header. One recorder per candidate loop.
    pub fn create(path: &Path, runtime_version: &str, budget: u32) -> Result<Self> {
        if budget == 0 {
            return Err(anyhow!("retry budget must be > 0"));
        }
        let mut header = String::from("---\n");
        header.push_str(&format!("runtime_version: \"{runtime_version}\"\n"));
        header.push_str(&format!("start_time: {:.6}\n", unix_now()));
        header.push_str("iterations:\n");
        append_text(path, &header)?;
        debug!(path = %path.display(), budget, "iteration log created");
        Ok(Self {
            path: path.to_path_buf(),
            budget,
            started: Instant::now(),
            next_index: 1,
            finalized: false,
        })
    }

    /// 1-based index the next appended record must carry.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Append exactly one record, then enforce termination: the log is
    /// finalized when the loop reports success or when the next attempt
    /// would exceed the budget.
    pub fn append(&mut self, record: &IterationRecord<'_>, succeeded: bool) -> Result<RecorderVerdict> {
        if self.finalized {
            return Err(anyhow!("iteration log already finalized"));
        }
        if record.index != self.next_index {
            return Err(anyhow!(
                "iteration records must be appended in order (expected {}, got {})",
                self.next_index,
                record.index
            ));
        }
        append_text(&self.path, &render_record(record))?;
        self.next_index += 1;

        if succeeded {
            self.finalize()?;
            return Ok(RecorderVerdict::Finalized(StopCause::Succeeded));
        }
        if record.index + 1 > self.budget {
            self.finalize()?;
            return Ok(RecorderVerdict::Finalized(StopCause::BudgetExhausted));
        }
        Ok(RecorderVerdict::Continue)
    }

    /// Write the end-time trailer. Called exactly once, from `append`.
    fn finalize(&mut self) -> Result<()> {
        let trailer = format!(
            "end_time: {:.6}\ntotal_time: {:.6}\n",
            unix_now(),
            self.started.elapsed().as_secs_f64()
        );
        append_text(&self.path, &trailer)?;
        self.finalized = true;
        debug!(path = %self.path.display(), "iteration log finalized");
        Ok(())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Render one iteration block as a YAML sequence item.
///
/// The error text goes into a block scalar with an explicit indentation
/// indicator so log lines that begin with spaces (tracebacks, pip output)
/// cannot shift the parser's idea of where the block ends.
fn render_record(record: &IterationRecord<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!("- index: {}\n", record.index));
    if record.packages.is_empty() {
        out.push_str("  packages: {}\n");
    } else {
        out.push_str("  packages:\n");
        for entry in record.packages.iter() {
            match &entry.version {
                Some(version) => {
                    out.push_str(&format!("    {}: \"{}\"\n", entry.name, version));
                }
                None => out.push_str(&format!("    {}: null\n", entry.name)),
            }
        }
    }
    out.push_str(&format!("  error_kind: {}\n", record.error_kind));
    if record.error.trim().is_empty() {
        out.push_str("  error: \"\"\n");
    } else {
        out.push_str("  error: |2\n");
        for line in record.error.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("    {line}\n"));
            }
        }
    }
    out
}

fn append_text(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open iteration log {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("append iteration log {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use std::fs;

    fn packages(pairs: &[(&str, Option<&str>)]) -> PackageSet {
        let mut set = PackageSet::new();
        for (name, version) in pairs {
            set.pin(name, version.map(str::to_string));
        }
        set
    }

    fn parse(path: &Path) -> Value {
        let text = fs::read_to_string(path).expect("read log");
        serde_yaml::from_str(&text).expect("log must stay parseable")
    }

    #[test]
    fn exactly_budget_records_are_written_before_forced_termination() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output_data_3.9.yml");
        let mut recorder = IterationRecorder::create(&path, "3.9", 2).expect("create");
        let set = packages(&[("requests", Some("2.31.0"))]);

        let first = recorder
            .append(
                &IterationRecord {
                    index: 1,
                    packages: &set,
                    error_kind: ErrorKind::ModuleNotFound,
                    error: "ModuleNotFoundError: No module named 'requests'",
                },
                false,
            )
            .expect("append 1");
        assert_eq!(first, RecorderVerdict::Continue);

        let second = recorder
            .append(
                &IterationRecord {
                    index: 2,
                    packages: &set,
                    error_kind: ErrorKind::NonZeroCode,
                    error: "still broken",
                },
                false,
            )
            .expect("append 2");
        assert_eq!(
            second,
            RecorderVerdict::Finalized(StopCause::BudgetExhausted)
        );

        let doc = parse(&path);
        let iterations = doc["iterations"].as_sequence().expect("iterations");
        assert_eq!(iterations.len(), 2);
        assert!(doc["end_time"].as_f64().is_some());
        assert!(doc["total_time"].as_f64().is_some());
    }

    #[test]
    fn success_finalizes_immediately() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output_data_3.8.yml");
        let mut recorder = IterationRecorder::create(&path, "3.8", 5).expect("create");
        let set = packages(&[]);

        let verdict = recorder
            .append(
                &IterationRecord {
                    index: 1,
                    packages: &set,
                    error_kind: ErrorKind::None,
                    error: "",
                },
                true,
            )
            .expect("append");
        assert_eq!(verdict, RecorderVerdict::Finalized(StopCause::Succeeded));

        let err = recorder
            .append(
                &IterationRecord {
                    index: 2,
                    packages: &set,
                    error_kind: ErrorKind::None,
                    error: "",
                },
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("already finalized"));
    }

    #[test]
    fn out_of_order_indices_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.yml");
        let mut recorder = IterationRecorder::create(&path, "3.9", 5).expect("create");
        let set = packages(&[]);

        let err = recorder
            .append(
                &IterationRecord {
                    index: 3,
                    packages: &set,
                    error_kind: ErrorKind::NonZeroCode,
                    error: "x",
                },
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("in order"));
    }

    #[test]
    fn log_round_trips_kinds_snapshots_and_indented_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.yml");
        let mut recorder = IterationRecorder::create(&path, "3.9", 5).expect("create");
        let set = packages(&[("pillow", Some("9.0.0")), ("numpy", None)]);

        // Leading-space first line: must not confuse the block scalar.
        let error = "  File \"snippet.py\", line 1\n\nModuleNotFoundError: No module named 'PIL'";
        recorder
            .append(
                &IterationRecord {
                    index: 1,
                    packages: &set,
                    error_kind: ErrorKind::ModuleNotFound,
                    error,
                },
                false,
            )
            .expect("append");

        let doc = parse(&path);
        assert_eq!(doc["runtime_version"].as_str(), Some("3.9"));
        let iteration = &doc["iterations"][0];
        assert_eq!(iteration["index"].as_u64(), Some(1));
        assert_eq!(iteration["error_kind"].as_str(), Some("ModuleNotFound"));
        assert_eq!(iteration["packages"]["pillow"].as_str(), Some("9.0.0"));
        assert!(iteration["packages"]["numpy"].is_null());
        let stored = iteration["error"].as_str().expect("error text");
        assert!(stored.starts_with("  File"));
        assert!(stored.contains("No module named 'PIL'"));
    }

    #[test]
    fn truncated_log_without_trailer_still_parses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("log.yml");
        let mut recorder = IterationRecorder::create(&path, "3.9", 5).expect("create");
        let set = packages(&[("requests", Some("2.0.0"))]);
        recorder
            .append(
                &IterationRecord {
                    index: 1,
                    packages: &set,
                    error_kind: ErrorKind::SyntaxError,
                    error: "SyntaxError: invalid syntax",
                },
                false,
            )
            .expect("append");

        // A killed process never writes the trailer; the document must still load.
        let doc = parse(&path);
        assert_eq!(doc["iterations"].as_sequence().map(Vec::len), Some(1));
        assert!(doc.get("end_time").is_none());
    }
}
