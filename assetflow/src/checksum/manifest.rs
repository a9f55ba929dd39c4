//! The persisted checksum manifest.

use crate::errors::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

/// Ordered mapping from tracked path to hex digest.
///
/// Persisted as a pretty-printed JSON object with sorted keys and a
/// trailing newline, so diffs in version control stay one line per path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumManifest {
    entries: BTreeMap<String, String>,
}

impl ChecksumManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the digest of `path`.
    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    /// Returns the digest recorded for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(path, digest)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Loads a manifest from disk.
    ///
    /// Returns `Ok(None)` when the file does not exist, which means "no
    /// baseline" and is distinct from an empty manifest.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_str(&text).map_err(|e| {
            ValidationError::new(format!("malformed checksum manifest {}: {e}", path.display()))
                .with_subjects(vec![path.display().to_string()])
        })?;
        Ok(Some(manifest))
    }

    /// Writes the manifest to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        Ok(())
    }

    /// Renders the persisted form.
    #[must_use]
    pub fn render(&self) -> String {
        // A map of strings always serializes.
        let mut text = serde_json::to_string_pretty(&self.entries).unwrap_or_default();
        text.push('\n');
        text
    }

    /// Describes how `self` differs from `prior`, one line per path.
    #[must_use]
    pub fn differences(&self, prior: &Self) -> Vec<String> {
        let mut lines = Vec::new();
        for (path, digest) in &self.entries {
            match prior.entries.get(path) {
                None => lines.push(format!("{path}: added ({digest})")),
                Some(old) if old != digest => {
                    lines.push(format!("{path}: changed ({old} -> {digest})"));
                }
                Some(_) => {}
            }
        }
        for (path, digest) in &prior.entries {
            if !self.entries.contains_key(path) {
                lines.push(format!("{path}: removed ({digest})"));
            }
        }
        lines
    }
}

impl FromIterator<(String, String)> for ChecksumManifest {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for ChecksumManifest {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest(pairs: &[(&str, &str)]) -> ChecksumManifest {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_is_sorted_with_trailing_newline() {
        let m = manifest(&[("b.js", "22"), ("a.js", "11")]);
        assert_eq!(m.render(), "{\n  \"a.js\": \"11\",\n  \"b.js\": \"22\"\n}\n");
    }

    #[test]
    fn test_load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ChecksumManifest::load(&dir.path().join("checksums.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_manifest_is_a_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        ChecksumManifest::new().save(&path).unwrap();

        let loaded = ChecksumManifest::load(&path).unwrap();
        assert_eq!(loaded, Some(ChecksumManifest::new()));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        let m = manifest(&[("lib/a.js", "abc")]);
        m.save(&path).unwrap();

        assert_eq!(ChecksumManifest::load(&path).unwrap(), Some(m));
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checksums.json");
        std::fs::write(&path, "not json").unwrap();

        let err = ChecksumManifest::load(&path).unwrap_err();
        assert!(matches!(err, crate::errors::AssetflowError::Validation(_)));
    }

    #[test]
    fn test_differences() {
        let prior = manifest(&[("a.js", "1"), ("b.js", "2"), ("c.js", "3")]);
        let fresh = manifest(&[("a.js", "1"), ("b.js", "9"), ("d.js", "4")]);

        assert_eq!(
            fresh.differences(&prior),
            vec![
                "b.js: changed (2 -> 9)".to_string(),
                "d.js: added (4)".to_string(),
                "c.js: removed (3)".to_string(),
            ]
        );
        assert!(prior.differences(&prior).is_empty());
    }
}
