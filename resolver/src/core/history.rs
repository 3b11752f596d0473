//! Per-loop error bookkeeping: occurrence counts and already-failed versions.

use std::collections::BTreeMap;

use crate::core::types::ErrorKind;

/// Mutable per-loop error state.
///
/// `offending` maps a package name to every version that has been tried and
/// failed for it, in failure order. The correction planner consults it to
/// refuse re-proposing a failed version (the non-convergence guard).
#[derive(Debug, Clone, Default)]
pub struct ErrorHistory {
    counts: BTreeMap<ErrorKind, u32>,
    last_kind: Option<ErrorKind>,
    offending: BTreeMap<String, Vec<String>>,
    runtimes_tried: Vec<String>,
}

/// Placeholder recorded when a package failed without an explicit pin.
const ANY_VERSION: &str = "*";

impl ErrorHistory {
    pub fn observe(&mut self, kind: ErrorKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
        self.last_kind = Some(kind);
    }

    pub fn count(&self, kind: ErrorKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn last_kind(&self) -> Option<ErrorKind> {
        self.last_kind
    }

    /// Record that `version` of `name` has failed. Callers record at
    /// correction time, so every entry corresponds to a package that was
    /// present in the specification at some point.
    pub fn record_failure(&mut self, name: &str, version: Option<&str>) {
        self.offending
            .entry(name.to_string())
            .or_default()
            .push(version.unwrap_or(ANY_VERSION).to_string());
    }

    pub fn already_failed(&self, name: &str, version: &str) -> bool {
        self.offending
            .get(name)
            .is_some_and(|versions| versions.iter().any(|tried| tried == version))
    }

    pub fn failed_versions(&self, name: &str) -> &[String] {
        self.offending
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mark a runtime version as tried (SyntaxError fallback bookkeeping).
    pub fn record_runtime(&mut self, version: &str) {
        if !self.runtimes_tried.iter().any(|tried| tried == version) {
            self.runtimes_tried.push(version.to_string());
        }
    }

    pub fn runtimes_tried(&self) -> &[String] {
        &self.runtimes_tried
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_counts_per_kind_and_tracks_last() {
        let mut history = ErrorHistory::default();
        history.observe(ErrorKind::ModuleNotFound);
        history.observe(ErrorKind::ModuleNotFound);
        history.observe(ErrorKind::SyntaxError);

        assert_eq!(history.count(ErrorKind::ModuleNotFound), 2);
        assert_eq!(history.count(ErrorKind::SyntaxError), 1);
        assert_eq!(history.count(ErrorKind::NameError), 0);
        assert_eq!(history.last_kind(), Some(ErrorKind::SyntaxError));
    }

    #[test]
    fn failed_versions_accumulate_in_order() {
        let mut history = ErrorHistory::default();
        history.record_failure("pillow", Some("9.0.0"));
        history.record_failure("pillow", Some("8.4.0"));
        history.record_failure("requests", None);

        assert_eq!(history.failed_versions("pillow"), ["9.0.0", "8.4.0"]);
        assert!(history.already_failed("pillow", "8.4.0"));
        assert!(!history.already_failed("pillow", "8.3.0"));
        assert!(!history.already_failed("requests", "2.31.0"));
    }

    #[test]
    fn runtimes_tried_deduplicates() {
        let mut history = ErrorHistory::default();
        history.record_runtime("3.9");
        history.record_runtime("3.9");
        history.record_runtime("3.8");

        assert_eq!(history.runtimes_tried(), ["3.9", "3.8"]);
    }
}
