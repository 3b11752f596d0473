//! Shared deterministic types for resolver core logic.
//!
//! These types define stable contracts between core components. They should
//! not depend on external state or I/O and must remain deterministic across
//! runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of one build/run attempt.
///
/// Closed set: the correction planner matches exhaustively on these, and the
/// iteration log serializes them under exactly these spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ImportError,
    ModuleNotFound,
    VersionNotFound,
    DependencyConflict,
    AttributeError,
    InvalidVersion,
    NonZeroCode,
    SyntaxError,
    NameError,
    None,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ImportError => "ImportError",
            ErrorKind::ModuleNotFound => "ModuleNotFound",
            ErrorKind::VersionNotFound => "VersionNotFound",
            ErrorKind::DependencyConflict => "DependencyConflict",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::InvalidVersion => "InvalidVersion",
            ErrorKind::NonZeroCode => "NonZeroCode",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::NameError => "NameError",
            ErrorKind::None => "None",
        }
    }

    /// Kinds that terminate the loop as an acceptable pass: the program ran
    /// with no dependency-layer error signal. `NameError` counts because it
    /// means the imports resolved and the program itself is at fault.
    pub fn is_acceptable_pass(self) -> bool {
        matches!(self, ErrorKind::None | ErrorKind::NameError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output: the failure kind plus the implicated package and
/// version, when they could be extracted from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub kind: ErrorKind,
    pub package: Option<String>,
    pub version: Option<String>,
}

impl Diagnosis {
    pub fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            package: None,
            version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_under_spec_spellings() {
        let json = serde_json::to_string(&ErrorKind::ModuleNotFound).expect("serialize");
        assert_eq!(json, "\"ModuleNotFound\"");
        let back: ErrorKind = serde_json::from_str("\"NonZeroCode\"").expect("deserialize");
        assert_eq!(back, ErrorKind::NonZeroCode);
    }

    #[test]
    fn acceptable_passes_are_none_and_name_error() {
        assert!(ErrorKind::None.is_acceptable_pass());
        assert!(ErrorKind::NameError.is_acceptable_pass());
        assert!(!ErrorKind::ImportError.is_acceptable_pass());
        assert!(!ErrorKind::SyntaxError.is_acceptable_pass());
    }
}
