//! Dependency specifications and value-comparable dependency sets.

use crate::errors::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::str::FromStr;

/// A single extra dependency, in `group:name:version` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Publishing group or organization.
    pub group: String,
    /// Artifact name.
    pub name: String,
    /// Exact version.
    pub version: String,
}

impl DependencySpec {
    /// Creates a new dependency spec.
    #[must_use]
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

impl FromStr for DependencySpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [group, name, version]
                if !group.is_empty() && !name.is_empty() && !version.is_empty() =>
            {
                Ok(Self::new(*group, *name, *version))
            }
            _ => Err(ValidationError::new(format!(
                "dependency must be 'group:name:version', got '{s}'"
            ))
            .with_subjects(vec![s.to_string()])),
        }
    }
}

/// An ordered set of dependencies compared by value.
///
/// Two sets built from the same specs in any order are equal and hash the
/// same, which is what the context cache keys on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencySet(BTreeSet<DependencySpec>);

impl DependencySet {
    /// Creates an empty set (the base environment only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a set from `group:name:version` strings.
    pub fn parse<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = specs
            .into_iter()
            .map(|s| s.as_ref().parse::<DependencySpec>())
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(Self(parsed))
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with(mut self, spec: DependencySpec) -> Self {
        self.0.insert(spec);
        self
    }

    /// Returns the number of extra dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if only the base environment is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the dependencies in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &DependencySpec> {
        self.0.iter()
    }

    /// Returns a stable hex fingerprint of the set.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in &self.0 {
            hasher.update(spec.to_string().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<DependencySpec> for DependencySet {
    fn from_iter<T: IntoIterator<Item = DependencySpec>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for DependencySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec() {
        let spec: DependencySpec = "org.webjars:jquery:3.7.1".parse().unwrap();
        assert_eq!(spec.group, "org.webjars");
        assert_eq!(spec.name, "jquery");
        assert_eq!(spec.version, "3.7.1");
        assert_eq!(spec.to_string(), "org.webjars:jquery:3.7.1");
    }

    #[test]
    fn test_parse_spec_invalid() {
        assert!("jquery".parse::<DependencySpec>().is_err());
        assert!("a::1".parse::<DependencySpec>().is_err());
        assert!("a:b:c:d".parse::<DependencySpec>().is_err());
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = DependencySet::parse(["x:a:1", "y:b:2"]).unwrap();
        let b = DependencySet::parse(["y:b:2", "x:a:1", "x:a:1"]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_version() {
        let a = DependencySet::parse(["x:a:1"]).unwrap();
        let b = DependencySet::parse(["x:a:2"]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
