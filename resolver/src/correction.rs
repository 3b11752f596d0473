//! Correction orchestration: classified failure -> mutated specification.
//!
//! Coordinates the pure planner (`core::correction`) with the suggestion and
//! index collaborators. Every package name is canonicalized before the
//! specification is touched, so aliased spellings can never accumulate as
//! duplicate entries.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::classifier;
use crate::core::correction::{CorrectionAction, CorrectionContext, LogSignals, is_replace_kind, plan};
use crate::core::env_spec::EnvSpec;
use crate::core::history::ErrorHistory;
use crate::core::types::Diagnosis;
use crate::io::index::{self, PackageIndex};
use crate::io::suggest::{ReplacementRequest, Suggester};

/// Apply the correction for one failed attempt to `spec`.
pub fn apply_correction<S: Suggester, I: PackageIndex>(
    spec: &mut EnvSpec,
    diagnosis: &Diagnosis,
    log: &str,
    history: &mut ErrorHistory,
    suggester: &S,
    index: &I,
) -> Result<()> {
    let diagnosis = canonicalized(diagnosis, index)?;

    let signals = LogSignals {
        nonzero_install_step: classifier::has_nonzero_step_signal(log),
        path_environment: classifier::has_path_environment_signal(log),
    };

    // Record what just failed before asking for anything new.
    let failing_version = diagnosis.package.as_deref().and_then(|name| {
        spec.packages
            .get(name)
            .and_then(|entry| entry.version.clone())
            .or_else(|| diagnosis.version.clone())
    });
    if is_replace_kind(diagnosis.kind)
        && let Some(name) = diagnosis.package.as_deref()
    {
        history.record_failure(name, failing_version.as_deref());
    }

    let suggestion = if is_replace_kind(diagnosis.kind)
        && let Some(name) = diagnosis.package.as_deref()
    {
        suggester.suggest_replacement(&ReplacementRequest {
            package: name,
            failing_version: failing_version.as_deref(),
            runtime_version: &spec.runtime_version,
            failed_versions: history.failed_versions(name),
            log,
        })?
    } else {
        None
    };

    let anchor = match classifier::install_step_package(log) {
        Some((name, _)) => Some(index.canonicalize(&name)?),
        None => None,
    };
    let runtime_fallback = index::next_older_runtime(&spec.runtime_version, history.runtimes_tried());

    let ctx = CorrectionContext {
        signals,
        suggestion: suggestion.as_deref(),
        anchor: anchor.as_deref(),
        runtime_fallback,
    };
    let action = plan(&diagnosis, &ctx, history);
    debug!(kind = %diagnosis.kind, ?action, "planned correction");
    apply(spec, history, action);
    log_spec_delta(spec);
    Ok(())
}

/// Report what the correction changed, from the pre-correction snapshot.
fn log_spec_delta(spec: &EnvSpec) {
    let Some(previous) = spec.previous_packages.as_ref() else {
        return;
    };
    for entry in previous.iter() {
        match spec.packages.get(&entry.name) {
            None => info!(package = %entry.name, "dropped from specification"),
            Some(current) if current.version != entry.version => info!(
                package = %entry.name,
                from = entry.version.as_deref().unwrap_or("any"),
                to = current.version.as_deref().unwrap_or("any"),
                "pin changed"
            ),
            _ => {}
        }
    }
    for entry in spec.packages.iter() {
        if previous.get(&entry.name).is_none() {
            info!(package = %entry.name, "added to specification");
        }
    }
}

fn canonicalized<I: PackageIndex>(diagnosis: &Diagnosis, index: &I) -> Result<Diagnosis> {
    let package = match diagnosis.package.as_deref() {
        Some(raw) => Some(index.canonicalize(raw)?),
        None => None,
    };
    Ok(Diagnosis {
        kind: diagnosis.kind,
        package,
        version: diagnosis.version.clone(),
    })
}

fn apply(spec: &mut EnvSpec, history: &mut ErrorHistory, action: CorrectionAction) {
    match action {
        CorrectionAction::Replace { name, version } => {
            spec.snapshot();
            spec.packages.pin(&name, Some(version));
        }
        CorrectionAction::ReplaceAndReorder {
            name,
            version,
            anchor,
        } => {
            spec.snapshot();
            info!(%name, %anchor, "reordering install after anchor");
            spec.packages.pin(&name, Some(version));
            spec.packages.move_after(&name, &anchor);
        }
        CorrectionAction::Remove { name } => {
            spec.snapshot();
            spec.packages.remove(&name);
        }
        CorrectionAction::SwitchRuntime { version } => {
            spec.snapshot();
            info!(from = %spec.runtime_version, to = %version, "switching runtime version");
            history.record_runtime(&spec.runtime_version);
            spec.runtime_version = version;
        }
        CorrectionAction::RetryUnchanged => {
            debug!("no correction; retrying unchanged");
        }
    }
}
