//! Fail-fast digest verification of a single tracked file.

use super::blocking;
use crate::checksum::DigestAlgorithm;
use crate::context::StageContext;
use crate::errors::{ChecksumMismatchError, Result, ValidationError};
use crate::fileset::Snapshot;
use crate::stages::Stage;
use async_trait::async_trait;

/// Checks a tracked file against an expected hex digest.
///
/// The comparison ignores case. Without an explicit algorithm it is
/// inferred from the digest length (32 hex chars for MD5, 64 for SHA-256).
#[derive(Debug, Clone)]
pub struct VerifyDigestStage {
    name: String,
    path: String,
    expected: String,
    algorithm: Option<DigestAlgorithm>,
}

impl VerifyDigestStage {
    /// Creates a stage verifying `path` against `expected`.
    #[must_use]
    pub fn new(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            name: "verify".to_string(),
            path: path.into(),
            expected: expected.into().trim().to_string(),
            algorithm: None,
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Forces a digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    fn algorithm(&self) -> Result<DigestAlgorithm> {
        if let Some(algorithm) = self.algorithm {
            return Ok(algorithm);
        }
        [DigestAlgorithm::Md5, DigestAlgorithm::Sha256]
            .into_iter()
            .find(|a| a.hex_len() == self.expected.len())
            .ok_or_else(|| {
                ValidationError::new(format!(
                    "cannot infer digest algorithm for '{}' ({} hex chars)",
                    self.expected,
                    self.expected.len()
                ))
                .with_subjects(vec![self.path.clone()])
                .into()
            })
    }
}

#[async_trait]
impl Stage for VerifyDigestStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let algorithm = self.algorithm()?;
        let file = input.require(&self.path)?;
        let location = file.location().to_path_buf();
        let actual = blocking("digest", move || algorithm.digest_file(&location)).await?;

        if !actual.eq_ignore_ascii_case(&self.expected) {
            return Err(ChecksumMismatchError::new(
                file.path(),
                vec![format!("expected {algorithm} {}, got {actual}", self.expected)],
            )
            .into());
        }

        tracing::debug!(path = %file.path(), %algorithm, "Digest verified");
        Ok(input)
    }
}
