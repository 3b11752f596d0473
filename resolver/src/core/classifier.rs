//! Ordered marker table mapping raw build/run output to an [`ErrorKind`].
//!
//! Classification is substring-based over a priority-ordered rule table; the
//! first matching rule wins. The order is policy, not an accident: a log that
//! carries both a module-not-found marker and, say, a syntax-error traceback
//! must classify as `ModuleNotFound`, and the generic non-zero-code rule must
//! sit below the specific install failures so it only catches
//! otherwise-unexplained exits.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Diagnosis, ErrorKind};

/// One classification rule: any marker substring present => the kind.
struct MarkerRule {
    kind: ErrorKind,
    markers: &'static [&'static str],
}

/// Priority-ordered rule table. Extend by adding markers, not control flow.
const RULES: &[MarkerRule] = &[
    MarkerRule {
        kind: ErrorKind::ModuleNotFound,
        markers: &["ModuleNotFoundError", "No module named"],
    },
    MarkerRule {
        kind: ErrorKind::ImportError,
        markers: &["ImportError", "cannot import name"],
    },
    MarkerRule {
        kind: ErrorKind::VersionNotFound,
        markers: &[
            "Could not find a version that satisfies the requirement",
            "No matching distribution found",
        ],
    },
    MarkerRule {
        kind: ErrorKind::DependencyConflict,
        markers: &[
            "Failed building wheel",
            "error: subprocess-exited-with-error",
            "ResolutionImpossible",
            "Failed to build",
        ],
    },
    MarkerRule {
        kind: ErrorKind::InvalidVersion,
        markers: &["Invalid requirement", "InvalidVersion"],
    },
    MarkerRule {
        kind: ErrorKind::NonZeroCode,
        markers: &[
            "returned a non-zero code",
            "did not complete successfully: exit code",
        ],
    },
    MarkerRule {
        kind: ErrorKind::AttributeError,
        markers: &["AttributeError"],
    },
    MarkerRule {
        kind: ErrorKind::NameError,
        markers: &["NameError"],
    },
    MarkerRule {
        kind: ErrorKind::SyntaxError,
        markers: &["SyntaxError", "IndentationError", "TabError"],
    },
];

/// Marker for an unset framework settings variable. An `ImportError` carrying
/// this sentinel is not a dependency failure: the import layer resolved and
/// the remaining failure is application configuration.
pub const SETTINGS_SENTINEL: &str = "DJANGO_SETTINGS_MODULE is undefined";

pub fn is_settings_sentinel(log: &str) -> bool {
    log.contains(SETTINGS_SENTINEL)
}

/// Marker naming a broken PATH environment inside a failed install step.
pub const PATH_ENVIRONMENT_MARKER: &str = "PATH environment";

pub fn has_path_environment_signal(log: &str) -> bool {
    log.contains(PATH_ENVIRONMENT_MARKER)
}

/// Whether the log carries a failed-install-step marker (import-order case).
pub fn has_nonzero_step_signal(log: &str) -> bool {
    RULES
        .iter()
        .find(|rule| rule.kind == ErrorKind::NonZeroCode)
        .is_some_and(|rule| rule.markers.iter().any(|marker| log.contains(marker)))
}

/// Classify one attempt's output.
///
/// `exited_nonzero` only matters when no marker matched: an unexplained
/// non-zero exit is `NonZeroCode`, a clean log with a zero exit is `None`.
pub fn classify(log: &str, exited_nonzero: bool) -> ErrorKind {
    for rule in RULES {
        if rule.markers.iter().any(|marker| log.contains(marker)) {
            return rule.kind;
        }
    }
    if exited_nonzero {
        ErrorKind::NonZeroCode
    } else {
        ErrorKind::None
    }
}

/// Classify and extract the implicated package/version for the matched kind.
pub fn diagnose(log: &str, exited_nonzero: bool) -> Diagnosis {
    let kind = classify(log, exited_nonzero);
    let (package, version) = implicated(kind, log);
    Diagnosis {
        kind,
        package,
        version,
    }
}

static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No module named '?"?([A-Za-z0-9_][A-Za-z0-9_.]*)"#).expect("module regex")
});
static IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"cannot import name '[^']+' from '([A-Za-z0-9_][A-Za-z0-9_.]*)'")
        .expect("import-from regex")
});
static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"satisfies the requirement ([A-Za-z0-9][A-Za-z0-9._-]*)(?:==([0-9][^\s;,)]*))?")
        .expect("requirement regex")
});
static DISTRIBUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No matching distribution found for ([A-Za-z0-9][A-Za-z0-9._-]*)(?:==(\S+))?")
        .expect("distribution regex")
});
static WHEEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Failed building wheel for ([A-Za-z0-9][A-Za-z0-9._-]*)").expect("wheel regex")
});
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"module '([A-Za-z0-9_][A-Za-z0-9_.]*)' has no attribute")
        .expect("attribute regex")
});
static INVALID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Invalid requirement:? '?([A-Za-z0-9][A-Za-z0-9._-]*)(?:==([^'\s]+))?")
        .expect("invalid-requirement regex")
});
static INSTALL_STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9][A-Za-z0-9._-]*)==([0-9][^\s'\x22,\]]*)").expect("install regex")
});

fn implicated(kind: ErrorKind, log: &str) -> (Option<String>, Option<String>) {
    match kind {
        ErrorKind::ModuleNotFound => (top_level_module(&capture1(&MODULE_RE, log)), None),
        ErrorKind::ImportError => {
            let package = capture1(&IMPORT_FROM_RE, log).or_else(|| capture1(&MODULE_RE, log));
            (top_level_module(&package), None)
        }
        ErrorKind::VersionNotFound => {
            let (package, version) = capture2(&REQUIREMENT_RE, log);
            if package.is_some() {
                (package, version)
            } else {
                capture2(&DISTRIBUTION_RE, log)
            }
        }
        ErrorKind::DependencyConflict => {
            let package = capture1(&WHEEL_RE, log);
            if package.is_some() {
                (package, None)
            } else {
                capture2(&REQUIREMENT_RE, log)
            }
        }
        ErrorKind::InvalidVersion => capture2(&INVALID_RE, log),
        ErrorKind::AttributeError => (top_level_module(&capture1(&ATTRIBUTE_RE, log)), None),
        ErrorKind::NonZeroCode => match install_step_package(log) {
            Some((name, version)) => (Some(name), Some(version)),
            None => (None, None),
        },
        ErrorKind::SyntaxError | ErrorKind::NameError | ErrorKind::None => (None, None),
    }
}

/// Extract `(name, version)` from the failed `pip install name==version` step
/// of a non-zero build log. Used both for diagnosis and as the reorder anchor
/// in import-order corrections.
pub fn install_step_package(log: &str) -> Option<(String, String)> {
    let line = log.lines().find(|line| {
        line.contains("returned a non-zero code")
            || line.contains("did not complete successfully: exit code")
    })?;
    let caps = INSTALL_STEP_RE.captures_iter(line).last()?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn capture1(re: &Regex, log: &str) -> Option<String> {
    re.captures(log).map(|caps| caps[1].to_string())
}

fn capture2(re: &Regex, log: &str) -> (Option<String>, Option<String>) {
    match re.captures(log) {
        Some(caps) => (
            Some(caps[1].to_string()),
            caps.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (None, None),
    }
}

/// Imports surface as dotted paths; the installable unit is the top level.
fn top_level_module(name: &Option<String>) -> Option<String> {
    name.as_deref()
        .and_then(|name| name.split('.').next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_not_found_wins_over_lower_priority_markers() {
        // Priority order is total: co-occurring markers must not change the kind.
        let log = "SyntaxError: invalid syntax\n\
                   ModuleNotFoundError: No module named 'requests'\n\
                   AttributeError: module 'os' has no attribute 'meow'";
        assert_eq!(classify(log, true), ErrorKind::ModuleNotFound);
    }

    #[test]
    fn module_not_found_extracts_top_level_package() {
        let diagnosis = diagnose("ModuleNotFoundError: No module named 'requests'", true);
        assert_eq!(diagnosis.kind, ErrorKind::ModuleNotFound);
        assert_eq!(diagnosis.package.as_deref(), Some("requests"));

        let dotted = diagnose("ImportError: No module named matplotlib.pyplot", true);
        assert_eq!(dotted.kind, ErrorKind::ModuleNotFound);
        assert_eq!(dotted.package.as_deref(), Some("matplotlib"));
    }

    #[test]
    fn import_error_extracts_source_module() {
        let log = "ImportError: cannot import name 'soft_unicode' from 'markupsafe'";
        let diagnosis = diagnose(log, true);
        assert_eq!(diagnosis.kind, ErrorKind::ImportError);
        assert_eq!(diagnosis.package.as_deref(), Some("markupsafe"));
    }

    #[test]
    fn version_not_found_extracts_name_and_version() {
        let log = "ERROR: Could not find a version that satisfies the requirement pillow==99.0.0";
        let diagnosis = diagnose(log, true);
        assert_eq!(diagnosis.kind, ErrorKind::VersionNotFound);
        assert_eq!(diagnosis.package.as_deref(), Some("pillow"));
        assert_eq!(diagnosis.version.as_deref(), Some("99.0.0"));
    }

    #[test]
    fn wheel_failure_maps_to_dependency_conflict() {
        let diagnosis = diagnose("  Failed building wheel for numpy", true);
        assert_eq!(diagnosis.kind, ErrorKind::DependencyConflict);
        assert_eq!(diagnosis.package.as_deref(), Some("numpy"));
    }

    #[test]
    fn invalid_requirement_maps_to_invalid_version() {
        let diagnosis = diagnose("ERROR: Invalid requirement: 'requests==not-a-version'", true);
        assert_eq!(diagnosis.kind, ErrorKind::InvalidVersion);
        assert_eq!(diagnosis.package.as_deref(), Some("requests"));
        assert_eq!(diagnosis.version.as_deref(), Some("not-a-version"));
    }

    #[test]
    fn attribute_error_extracts_module() {
        let log = "AttributeError: module 'tensorflow.compat' has no attribute 'v1'";
        let diagnosis = diagnose(log, true);
        assert_eq!(diagnosis.kind, ErrorKind::AttributeError);
        assert_eq!(diagnosis.package.as_deref(), Some("tensorflow"));
    }

    #[test]
    fn install_step_anchor_comes_from_the_failed_command_line() {
        let log = "Step 5/9 : RUN pip install --default-timeout=100 scipy==1.5.4\n\
                   The command 'pip install --default-timeout=100 scipy==1.5.4' \
                   returned a non-zero code: 1";
        let (name, version) = install_step_package(log).expect("anchor");
        assert_eq!(name, "scipy");
        assert_eq!(version, "1.5.4");
    }

    #[test]
    fn unexplained_nonzero_exit_is_non_zero_code() {
        assert_eq!(classify("the program printed nothing useful", true), ErrorKind::NonZeroCode);
    }

    #[test]
    fn clean_log_with_zero_exit_is_none() {
        assert_eq!(classify("hello world\n42\n", false), ErrorKind::None);
    }

    #[test]
    fn settings_sentinel_is_detected_but_still_classifies_as_import_error() {
        // The pass decision belongs to the resolution loop, not the table.
        let log = "ImportError: Settings cannot be imported, because environment variable \
                   DJANGO_SETTINGS_MODULE is undefined.";
        assert_eq!(classify(log, true), ErrorKind::ImportError);
        assert!(is_settings_sentinel(log));
    }

    #[test]
    fn syntax_and_name_errors_classify_without_a_package() {
        let syntax = diagnose("  File \"snippet.py\", line 3\nSyntaxError: invalid syntax", true);
        assert_eq!(syntax.kind, ErrorKind::SyntaxError);
        assert_eq!(syntax.package, None);

        let name = diagnose("NameError: name 'raw_input' is not defined", true);
        assert_eq!(name.kind, ErrorKind::NameError);
    }
}
