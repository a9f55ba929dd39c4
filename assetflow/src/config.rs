//! Configuration for pipeline runs.

use crate::checksum::DigestAlgorithm;
use crate::errors::{Result, ValidationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Repository root; the checksum manifest lives here.
    #[serde(default = "default_repository_root")]
    pub repository_root: PathBuf,
    /// File name of the checksum manifest, relative to the repository root.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Regex patterns selecting the tracked paths to checksum.
    #[serde(default)]
    pub checksum_patterns: Vec<String>,
    /// Digest used for checksum manifests.
    #[serde(default)]
    pub digest: DigestAlgorithm,
    /// Environment variables that signal a non-interactive CI run.
    #[serde(default = "default_ci_variables")]
    pub ci_variables: Vec<String>,
    /// Deadline for a single isolated-context invocation, in seconds.
    #[serde(default)]
    pub invoke_timeout_seconds: Option<f64>,
    /// HTTP fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_repository_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_manifest_file() -> String {
    "checksums.json".to_string()
}

fn default_ci_variables() -> Vec<String> {
    vec!["CI".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repository_root: default_repository_root(),
            manifest_file: default_manifest_file(),
            checksum_patterns: Vec::new(),
            digest: DigestAlgorithm::default(),
            ci_variables: default_ci_variables(),
            invoke_timeout_seconds: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the repository root.
    #[must_use]
    pub fn with_repository_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repository_root = root.into();
        self
    }

    /// Sets the manifest file name.
    #[must_use]
    pub fn with_manifest_file(mut self, name: impl Into<String>) -> Self {
        self.manifest_file = name.into();
        self
    }

    /// Adds a checksum pattern.
    #[must_use]
    pub fn with_checksum_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.checksum_patterns.push(pattern.into());
        self
    }

    /// Replaces the checksum patterns.
    #[must_use]
    pub fn with_checksum_patterns(mut self, patterns: Vec<String>) -> Self {
        self.checksum_patterns = patterns;
        self
    }

    /// Sets the digest algorithm.
    #[must_use]
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Replaces the CI signal variable names.
    #[must_use]
    pub fn with_ci_variables(mut self, names: Vec<String>) -> Self {
        self.ci_variables = names;
        self
    }

    /// Sets the invocation deadline.
    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    /// Returns the full path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.repository_root.join(&self.manifest_file)
    }

    /// Returns the invocation deadline as a Duration.
    #[must_use]
    pub fn invoke_timeout(&self) -> Option<Duration> {
        self.invoke_timeout_seconds.map(Duration::from_secs_f64)
    }

    /// Compiles the checksum patterns.
    pub fn compiled_patterns(&self) -> Result<Vec<Regex>> {
        self.checksum_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ValidationError::new(format!("invalid checksum pattern '{p}': {e}"))
                        .with_subjects(vec![p.clone()])
                        .into()
                })
            })
            .collect()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.manifest_file.trim().is_empty() {
            return Err(ValidationError::new("manifest_file must not be empty").into());
        }
        if let Some(seconds) = self.invoke_timeout_seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ValidationError::new(format!(
                    "invoke_timeout_seconds must be positive, got {seconds}"
                ))
                .into());
            }
        }
        self.compiled_patterns()?;
        Ok(())
    }
}

/// Configuration for HTTP fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_size")]
    pub max_response_size: usize,
}

fn default_timeout() -> f64 {
    60.0
}

fn default_user_agent() -> String {
    format!("assetflow/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_size() -> usize {
    200 * 1024 * 1024 // 200MB
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            max_response_size: default_max_size(),
        }
    }
}

impl FetchConfig {
    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}
