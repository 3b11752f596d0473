//! Environment specification: one candidate runtime plus ordered package pins.

use serde::{Deserialize, Serialize};

/// One pinned (or unpinned) package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    /// `None` means "any version".
    pub version: Option<String>,
}

/// Insertion-ordered package -> version-constraint mapping.
///
/// Order is significant: it determines install order inside the generated
/// build. Names must be canonicalized before insertion; `pin` updates in
/// place, so two entries can never share a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    entries: Vec<PackageEntry>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Pin `name` to `version`. An existing entry is updated in place
    /// (keeping its install position); a new entry is appended.
    pub fn pin(&mut self, name: &str, version: Option<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.name == name) {
            entry.version = version;
            return;
        }
        self.entries.push(PackageEntry {
            name: name.to_string(),
            version,
        });
    }

    /// Remove `name`. Returns whether an entry was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.name != name);
        self.entries.len() != before
    }

    /// Move `name` so it installs immediately after `anchor`.
    ///
    /// No-op when either package is absent or the two names are equal.
    pub fn move_after(&mut self, name: &str, anchor: &str) {
        if name == anchor || !self.contains(anchor) {
            return;
        }
        let Some(from) = self.entries.iter().position(|entry| entry.name == name) else {
            return;
        };
        let entry = self.entries.remove(from);
        let anchor_pos = self
            .entries
            .iter()
            .position(|entry| entry.name == anchor)
            .unwrap_or(self.entries.len().saturating_sub(1));
        self.entries.insert(anchor_pos + 1, entry);
    }
}

/// One candidate environment: runtime version plus ordered package pins.
///
/// `previous_packages` snapshots `packages` immediately before the most
/// recent correction, so the iteration log can record what the failed
/// attempt actually installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSpec {
    pub runtime_version: String,
    pub packages: PackageSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_packages: Option<PackageSet>,
}

impl EnvSpec {
    pub fn new(runtime_version: impl Into<String>) -> Self {
        Self {
            runtime_version: runtime_version.into(),
            packages: PackageSet::new(),
            previous_packages: None,
        }
    }

    /// Snapshot the current package set before a correction mutates it.
    pub fn snapshot(&mut self) {
        self.previous_packages = Some(self.packages.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[(&str, Option<&str>)]) -> PackageSet {
        let mut packages = PackageSet::new();
        for (name, version) in names {
            packages.pin(name, version.map(str::to_string));
        }
        packages
    }

    fn names(packages: &PackageSet) -> Vec<&str> {
        packages.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn pin_updates_in_place_and_keeps_order() {
        let mut packages = set(&[("requests", Some("2.0.0")), ("numpy", None)]);
        packages.pin("requests", Some("2.31.0".to_string()));

        assert_eq!(names(&packages), vec!["requests", "numpy"]);
        assert_eq!(
            packages.get("requests").expect("entry").version.as_deref(),
            Some("2.31.0")
        );
    }

    #[test]
    fn pin_never_duplicates_a_name() {
        let mut packages = set(&[("pillow", Some("9.0.0"))]);
        packages.pin("pillow", Some("8.4.0".to_string()));
        packages.pin("pillow", None);

        assert_eq!(packages.len(), 1);
        assert_eq!(packages.get("pillow").expect("entry").version, None);
    }

    #[test]
    fn remove_reports_presence() {
        let mut packages = set(&[("requests", None)]);
        assert!(packages.remove("requests"));
        assert!(!packages.remove("requests"));
        assert!(packages.is_empty());
    }

    #[test]
    fn move_after_places_immediately_after_anchor() {
        let mut packages = set(&[
            ("a", None),
            ("b", None),
            ("c", None),
            ("d", None),
        ]);
        packages.move_after("a", "c");
        assert_eq!(names(&packages), vec!["b", "c", "a", "d"]);

        packages.move_after("d", "b");
        assert_eq!(names(&packages), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn move_after_missing_anchor_is_a_noop() {
        let mut packages = set(&[("a", None), ("b", None)]);
        packages.move_after("a", "zzz");
        assert_eq!(names(&packages), vec!["a", "b"]);

        packages.move_after("zzz", "a");
        assert_eq!(names(&packages), vec!["a", "b"]);
    }

    #[test]
    fn snapshot_preserves_the_pre_correction_set() {
        let mut spec = EnvSpec::new("3.9");
        spec.packages.pin("requests", Some("2.0.0".to_string()));
        spec.snapshot();
        spec.packages.pin("requests", Some("2.31.0".to_string()));

        let previous = spec.previous_packages.as_ref().expect("snapshot");
        assert_eq!(
            previous.get("requests").expect("entry").version.as_deref(),
            Some("2.0.0")
        );
    }
}
