//! Detection of non-interactive (CI) execution.

use serde::{Deserialize, Serialize};

/// Whether a human can be asked to confirm checksum drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEnvironment {
    /// An operator may answer prompts.
    Interactive,
    /// Continuous integration; never prompt.
    ContinuousIntegration,
}

impl ExecutionEnvironment {
    /// Returns true for CI.
    #[must_use]
    pub fn is_ci(self) -> bool {
        self == Self::ContinuousIntegration
    }
}

/// Decides the execution environment from a list of signal variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiDetector {
    variables: Vec<String>,
}

impl Default for CiDetector {
    fn default() -> Self {
        Self::new(vec!["CI".to_string()])
    }
}

impl CiDetector {
    /// Creates a detector consulting `variables`.
    #[must_use]
    pub fn new(variables: Vec<String>) -> Self {
        Self { variables }
    }

    /// Returns the signal variable names.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Detects the environment from the process environment.
    #[must_use]
    pub fn detect(&self) -> ExecutionEnvironment {
        self.detect_with(|name| std::env::var(name).ok())
    }

    /// Detects the environment using `lookup` to read variables.
    pub fn detect_with<F>(&self, lookup: F) -> ExecutionEnvironment
    where
        F: Fn(&str) -> Option<String>,
    {
        let signalled = self
            .variables
            .iter()
            .find(|name| lookup(name).is_some_and(|value| is_set(&value)));
        match signalled {
            Some(name) => {
                tracing::debug!(variable = %name, "CI environment detected");
                ExecutionEnvironment::ContinuousIntegration
            }
            None => ExecutionEnvironment::Interactive,
        }
    }
}

/// A signal counts when it is non-empty and not `0` or `false`.
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_signal() {
        let detector = CiDetector::default();
        let vars = env(&[("CI", "true")]);
        assert!(detector.detect_with(|k| vars.get(k).cloned()).is_ci());
    }

    #[test]
    fn test_falsy_values_are_interactive() {
        let detector = CiDetector::default();
        for value in ["", "0", "false", "FALSE", "  "] {
            let vars = env(&[("CI", value)]);
            assert_eq!(
                detector.detect_with(|k| vars.get(k).cloned()),
                ExecutionEnvironment::Interactive,
                "value {value:?}"
            );
        }
    }

    #[test]
    fn test_configured_signals() {
        let detector = CiDetector::new(vec!["BUILD_ID".to_string(), "GITHUB_ACTIONS".to_string()]);
        let vars = env(&[("CI", "1"), ("GITHUB_ACTIONS", "true")]);
        assert!(detector.detect_with(|k| vars.get(k).cloned()).is_ci());

        let vars = env(&[("CI", "1")]);
        assert!(!detector.detect_with(|k| vars.get(k).cloned()).is_ci());
    }
}
