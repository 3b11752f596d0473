//! Resolution loop: build -> run -> classify -> correct for one candidate.
//!
//! The state machine drives a single candidate environment to a terminal
//! state. Classified failures are corrected and retried; collaborator
//! failures are charged to the budget as unexplained non-zero exits so an
//! attempt is never silently dropped; budget enforcement itself lives in the
//! iteration recorder.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::classifier::{self, is_settings_sentinel};
use crate::core::env_spec::EnvSpec;
use crate::core::history::ErrorHistory;
use crate::core::sanitize::sanitize_log;
use crate::core::types::{Diagnosis, ErrorKind};
use crate::correction::apply_correction;
use crate::interactive::OperatorSession;
use crate::io::container::{ContainerRunner, SourcePaths};
use crate::io::index::PackageIndex;
use crate::io::iteration_log::{IterationRecord, IterationRecorder, RecorderVerdict, StopCause};
use crate::io::suggest::Suggester;

/// Why the resolution loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// The program ran with no dependency-layer error signal.
    Succeeded,
    /// The retry budget ran out before the environment converged.
    BudgetExhausted,
}

/// Summary of one candidate's resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub runtime_version: String,
    pub attempts: u32,
    pub stop: LoopStop,
    pub last_kind: ErrorKind,
}

/// Inputs for one resolution loop.
#[derive(Debug, Clone)]
pub struct LoopRequest<'a> {
    pub source: &'a SourcePaths,
    /// Destination of the append-only iteration log.
    pub log_path: PathBuf,
    /// Retry budget (enforced by the recorder).
    pub budget: u32,
}

/// Drive one candidate environment to a terminal state.
///
/// `session` switches the loop into interactive mode: it pauses after every
/// failed attempt, and the first successful build terminates the session as
/// success without a run phase (the operator takes over from there).
pub fn run_resolution<C, S, I>(
    request: &LoopRequest<'_>,
    container: &mut C,
    suggester: &S,
    index: &I,
    spec: &mut EnvSpec,
    mut session: Option<&mut dyn OperatorSession>,
) -> Result<LoopOutcome>
where
    C: ContainerRunner,
    S: Suggester,
    I: PackageIndex,
{
    let mut recorder =
        IterationRecorder::create(&request.log_path, &spec.runtime_version, request.budget)?;
    let mut history = ErrorHistory::default();

    let outcome = loop {
        let attempt_index = recorder.next_index();
        info!(
            iteration = attempt_index,
            runtime = %spec.runtime_version,
            packages = spec.packages.len(),
            "starting attempt"
        );

        let attempt = observe_attempt(container, spec, request, session.is_some());
        let (log, diagnosis) = match attempt {
            Ok(observed) => observed,
            Err(err) => {
                // Collaborator failure: the attempt still consumes budget.
                warn!(err = %err, "collaborator failed; charging attempt as NonZeroCode");
                (
                    sanitize_log(&format!("resolver error: {err:#}")),
                    Diagnosis::bare(ErrorKind::NonZeroCode),
                )
            }
        };

        history.observe(diagnosis.kind);
        let passed = diagnosis.kind.is_acceptable_pass()
            || (diagnosis.kind == ErrorKind::ImportError && is_settings_sentinel(&log));

        let packages_snapshot = spec.packages.clone();
        let verdict = recorder.append(
            &IterationRecord {
                index: attempt_index,
                packages: &packages_snapshot,
                error_kind: diagnosis.kind,
                error: &log,
            },
            passed,
        )?;

        match verdict {
            RecorderVerdict::Finalized(StopCause::Succeeded) => {
                break LoopOutcome {
                    runtime_version: spec.runtime_version.clone(),
                    attempts: attempt_index,
                    stop: LoopStop::Succeeded,
                    last_kind: diagnosis.kind,
                };
            }
            RecorderVerdict::Finalized(StopCause::BudgetExhausted) => {
                break LoopOutcome {
                    runtime_version: spec.runtime_version.clone(),
                    attempts: attempt_index,
                    stop: LoopStop::BudgetExhausted,
                    last_kind: diagnosis.kind,
                };
            }
            RecorderVerdict::Continue => {}
        }

        apply_correction(spec, &diagnosis, &log, &mut history, suggester, index)?;
        if let Some(session) = session.as_deref_mut() {
            session.pause(&log, spec)?;
        }
    };

    // Terminal state: release build artifacts. Absence is not an error.
    container.remove_container()?;
    container.remove_image()?;

    info!(
        runtime = %outcome.runtime_version,
        attempts = outcome.attempts,
        stop = ?outcome.stop,
        "resolution loop finished"
    );
    Ok(outcome)
}

/// One build (and, when it succeeds, one run), classified.
fn observe_attempt<C: ContainerRunner>(
    container: &mut C,
    spec: &EnvSpec,
    request: &LoopRequest<'_>,
    interactive: bool,
) -> Result<(String, Diagnosis)> {
    let build = container.build(spec, request.source)?;
    if !build.ok {
        // Build failures classify directly; there is nothing to run.
        let log = sanitize_log(&build.log);
        let diagnosis = classifier::diagnose(&log, true);
        return Ok((log, diagnosis));
    }
    if interactive {
        // Operator mode stops at the first clean build.
        return Ok((String::new(), Diagnosis::bare(ErrorKind::None)));
    }

    let run = container.run()?;
    let log = sanitize_log(&run.log);
    let diagnosis = classifier::diagnose(&log, run.exited_nonzero);
    Ok((log, diagnosis))
}
