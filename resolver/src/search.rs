//! Search coordinator: one resolution-loop process per candidate runtime.
//!
//! Candidates run as independent OS processes (the resolver re-executes
//! itself in a hidden worker mode) so a crash in one candidate cannot
//! corrupt another's specification or log, and cancellation is a plain
//! process kill wrapped behind [`CandidateHandle`].

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};
use wait_timeout::ChildExt;

use crate::core::env_spec::EnvSpec;
use crate::io::index::PackageIndex;

/// Terminal state of one candidate process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateStatus {
    /// The loop process ran to completion with this exit code.
    Completed { exit_code: Option<i32> },
    /// The wall-clock ceiling expired and the process was cancelled.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOutcome {
    pub runtime_version: String,
    pub status: CandidateStatus,
}

/// Handle over one spawned candidate loop.
///
/// Wraps kill-based cancellation so coordinator logic never touches OS
/// process semantics directly.
pub struct CandidateHandle {
    runtime_version: String,
    child: Child,
}

impl CandidateHandle {
    pub fn new(runtime_version: impl Into<String>, child: Child) -> Self {
        Self {
            runtime_version: runtime_version.into(),
            child,
        }
    }

    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    /// Wait up to `timeout` for the loop to finish; cancel it on expiry.
    pub fn join(mut self, timeout: Duration) -> Result<CandidateOutcome> {
        let status = self
            .child
            .wait_timeout(timeout)
            .context("wait for candidate loop")?;
        let status = match status {
            Some(status) => status,
            None => {
                self.cancel()?;
                return Ok(CandidateOutcome {
                    runtime_version: self.runtime_version,
                    status: CandidateStatus::TimedOut,
                });
            }
        };
        Ok(CandidateOutcome {
            runtime_version: self.runtime_version,
            status: CandidateStatus::Completed {
                exit_code: status.code(),
            },
        })
    }

    fn cancel(&mut self) -> Result<()> {
        warn!(runtime = %self.runtime_version, "cancelling candidate loop");
        self.child.kill().context("kill candidate loop")?;
        self.child.wait().context("reap candidate loop")?;
        Ok(())
    }
}

/// Launches candidate loop processes. Production re-executes the resolver
/// binary; tests script this with stub commands.
pub trait CandidateLauncher {
    fn launch(&self, runtime_version: &str, seed: &EnvSpec) -> Result<CandidateHandle>;
}

/// Launcher that re-executes the current binary in worker mode, handing the
/// seed specification over on the child's stdin as JSON.
pub struct WorkerLauncher {
    pub file: PathBuf,
    pub endpoint: String,
    pub model: String,
    pub budget: u32,
}

impl CandidateLauncher for WorkerLauncher {
    fn launch(&self, runtime_version: &str, seed: &EnvSpec) -> Result<CandidateHandle> {
        let exe = std::env::current_exe().context("locate resolver binary")?;
        let mut seed = seed.clone();
        seed.runtime_version = runtime_version.to_string();

        let mut child = Command::new(exe)
            .arg("--file")
            .arg(&self.file)
            .arg("--endpoint")
            .arg(&self.endpoint)
            .arg("--model")
            .arg(&self.model)
            .arg("--loop")
            .arg(self.budget.to_string())
            .arg("--candidate")
            .arg(runtime_version)
            .stdin(Stdio::piped())
            .spawn()
            .context("spawn candidate loop")?;

        let payload = serde_json::to_vec(&seed).context("serialize seed spec")?;
        child
            .stdin
            .take()
            .context("candidate stdin was not piped")?
            .write_all(&payload)
            .context("write seed spec to candidate")?;

        Ok(CandidateHandle::new(runtime_version, child))
    }
}

/// Candidate runtimes for the search: `2r+1` centered on the suggestion.
///
/// The search must always run at least once, so an empty or failed range
/// query falls back to the suggested version alone.
pub fn candidate_versions<I: PackageIndex>(index: &I, center: &str, radius: u32) -> Vec<String> {
    match index.runtime_version_range(center, radius) {
        Ok(candidates) if !candidates.is_empty() => candidates,
        Ok(_) => vec![center.to_string()],
        Err(err) => {
            warn!(err = %err, %center, "runtime range query failed; using the center alone");
            vec![center.to_string()]
        }
    }
}

/// Launch one loop per candidate and join them all, each bounded by
/// `timeout` from launch. The coordinator aggregates terminal states but
/// does not pick a winner; each loop's log is the artifact of record.
pub fn run_search<L: CandidateLauncher>(
    launcher: &L,
    seed: &EnvSpec,
    candidates: &[String],
    timeout: Duration,
) -> Result<Vec<CandidateOutcome>> {
    let started = Instant::now();
    let mut handles = Vec::with_capacity(candidates.len());
    for version in candidates {
        info!(runtime = %version, "launching candidate loop");
        handles.push(launcher.launch(version, seed)?);
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let remaining = timeout.saturating_sub(started.elapsed());
        outcomes.push(handle.join(remaining)?);
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticIndex;

    /// Launcher that spawns plain commands instead of resolver workers.
    struct StubLauncher {
        program: &'static str,
        args: &'static [&'static str],
    }

    impl CandidateLauncher for StubLauncher {
        fn launch(&self, runtime_version: &str, _seed: &EnvSpec) -> Result<CandidateHandle> {
            let child = Command::new(self.program)
                .args(self.args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .context("spawn stub")?;
            Ok(CandidateHandle::new(runtime_version, child))
        }
    }

    #[test]
    fn range_one_launches_three_candidates() {
        let index = StaticIndex::default();
        let candidates = candidate_versions(&index, "3.9", 1);
        assert_eq!(candidates, ["3.8", "3.9", "3.10"]);

        let launcher = StubLauncher {
            program: "true",
            args: &[],
        };
        let outcomes = run_search(
            &launcher,
            &EnvSpec::new("3.9"),
            &candidates,
            Duration::from_secs(30),
        )
        .expect("search");
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            assert_eq!(
                outcome.status,
                CandidateStatus::Completed { exit_code: Some(0) }
            );
        }
    }

    #[test]
    fn unknown_center_falls_back_to_a_single_candidate() {
        let index = StaticIndex::default();
        assert_eq!(candidate_versions(&index, "9.9", 2), ["9.9"]);
    }

    #[test]
    fn expired_candidates_are_cancelled() {
        let launcher = StubLauncher {
            program: "sleep",
            args: &["30"],
        };
        let outcomes = run_search(
            &launcher,
            &EnvSpec::new("3.9"),
            &["3.9".to_string()],
            Duration::from_millis(100),
        )
        .expect("search");
        assert_eq!(outcomes[0].status, CandidateStatus::TimedOut);
    }
}
