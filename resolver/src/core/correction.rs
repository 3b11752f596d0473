//! Pure correction planning: classified failure -> next specification change.
//!
//! The planner is deliberately free of I/O: the orchestrator canonicalizes
//! names, records history, and queries the suggestion service, then hands the
//! results in. Everything here is a deterministic function of its inputs.

use crate::core::history::ErrorHistory;
use crate::core::types::{Diagnosis, ErrorKind};

/// Log signals that alter the correction for some kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSignals {
    /// A build install step failed with a non-zero code (import-order case).
    pub nonzero_install_step: bool,
    /// The failing step complained about the PATH environment.
    pub path_environment: bool,
}

/// Planned mutation of the environment specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionAction {
    /// Pin `name` to `version`.
    Replace { name: String, version: String },
    /// Pin `name` to `version`, then move it immediately after `anchor`.
    ReplaceAndReorder {
        name: String,
        version: String,
        anchor: String,
    },
    /// Drop `name` from the specification.
    Remove { name: String },
    /// Switch the loop to a different runtime version.
    SwitchRuntime { version: String },
    /// No mutation; attempt again as-is.
    RetryUnchanged,
}

/// Inputs gathered by the orchestrator before planning.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionContext<'a> {
    pub signals: LogSignals,
    /// Replacement version proposed by the suggestion service, if any.
    pub suggestion: Option<&'a str>,
    /// Anchor package from the failed install step (import-order case).
    pub anchor: Option<&'a str>,
    /// Next untried runtime candidate (SyntaxError fallback).
    pub runtime_fallback: Option<&'a str>,
}

/// Kinds corrected by replacing (or removing) the implicated package.
pub fn is_replace_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ModuleNotFound
            | ErrorKind::ImportError
            | ErrorKind::AttributeError
            | ErrorKind::VersionNotFound
            | ErrorKind::DependencyConflict
            | ErrorKind::InvalidVersion
    )
}

/// Decide the next action for a classified failure.
///
/// `diagnosis.package` must already be canonicalized. A suggestion that
/// repeats a version in `history` is treated as no suggestion: proposing it
/// again cannot converge, so the package is removed instead.
pub fn plan(
    diagnosis: &Diagnosis,
    ctx: &CorrectionContext<'_>,
    history: &ErrorHistory,
) -> CorrectionAction {
    match diagnosis.kind {
        kind @ (ErrorKind::ModuleNotFound
        | ErrorKind::ImportError
        | ErrorKind::AttributeError
        | ErrorKind::VersionNotFound
        | ErrorKind::DependencyConflict
        | ErrorKind::InvalidVersion) => {
            let Some(name) = diagnosis.package.as_deref() else {
                // Nothing actionable was extracted; burn the attempt as-is.
                return CorrectionAction::RetryUnchanged;
            };
            match usable_suggestion(name, ctx.suggestion, history) {
                Some(version) => {
                    if kind == ErrorKind::ImportError
                        && ctx.signals.nonzero_install_step
                        && let Some(anchor) = ctx.anchor
                        && anchor != name
                    {
                        CorrectionAction::ReplaceAndReorder {
                            name: name.to_string(),
                            version,
                            anchor: anchor.to_string(),
                        }
                    } else {
                        CorrectionAction::Replace {
                            name: name.to_string(),
                            version,
                        }
                    }
                }
                None => CorrectionAction::Remove {
                    name: name.to_string(),
                },
            }
        }
        ErrorKind::NonZeroCode => match diagnosis.package.as_deref() {
            // Spurious/unfixable install step; removed outright without
            // consulting the suggestion service. Without the PATH signal a
            // generic non-zero exit has no defined correction and simply
            // consumes budget.
            Some(name) if ctx.signals.path_environment => CorrectionAction::Remove {
                name: name.to_string(),
            },
            _ => CorrectionAction::RetryUnchanged,
        },
        ErrorKind::SyntaxError => match ctx.runtime_fallback {
            Some(version) => CorrectionAction::SwitchRuntime {
                version: version.to_string(),
            },
            None => CorrectionAction::RetryUnchanged,
        },
        ErrorKind::NameError | ErrorKind::None => CorrectionAction::RetryUnchanged,
    }
}

fn usable_suggestion(
    name: &str,
    suggestion: Option<&str>,
    history: &ErrorHistory,
) -> Option<String> {
    let version = suggestion?.trim();
    if version.is_empty() || history.already_failed(name, version) {
        return None;
    }
    Some(version.to_string())
}
