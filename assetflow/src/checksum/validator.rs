//! The checksum validation state machine and its stage.

use super::confirm::{AutoReject, ConfirmationSource, InteractiveConsole};
use super::digest::{digest_files, DigestAlgorithm};
use super::environment::{CiDetector, ExecutionEnvironment};
use super::manifest::ChecksumManifest;
use crate::context::StageContext;
use crate::errors::{ChecksumMismatchError, Result};
use crate::fileset::Snapshot;
use crate::stages::Stage;
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

/// How a validation pass ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// No manifest existed; the fresh one was written.
    FirstRun {
        /// Number of files recorded.
        files: usize,
    },
    /// The fresh manifest matched the persisted one.
    Unchanged,
    /// The operator accepted the listed differences.
    Confirmed {
        /// One line per changed path.
        differences: Vec<String>,
    },
}

/// Compares the digests of matched files with the persisted manifest.
pub struct ChecksumValidator {
    manifest_path: PathBuf,
    patterns: Vec<Regex>,
    digest: DigestAlgorithm,
    environment: ExecutionEnvironment,
    confirmation: Arc<dyn ConfirmationSource>,
}

impl ChecksumValidator {
    /// Creates a validator writing to `manifest_path`.
    ///
    /// Defaults to MD5, an interactive environment and console prompts.
    #[must_use]
    pub fn new(manifest_path: impl Into<PathBuf>, patterns: Vec<Regex>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            patterns,
            digest: DigestAlgorithm::default(),
            environment: ExecutionEnvironment::Interactive,
            confirmation: Arc::new(InteractiveConsole::new()),
        }
    }

    /// Sets the digest algorithm.
    #[must_use]
    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    /// Sets the execution environment.
    #[must_use]
    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets where confirmations come from in interactive environments.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationSource>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Digests every file of `snapshot` matching the patterns.
    pub async fn fresh_manifest(&self, snapshot: &Snapshot) -> Result<ChecksumManifest> {
        let files = snapshot
            .files_by_pattern(&self.patterns)
            .into_iter()
            .map(|f| (f.path().to_string(), f.location().to_path_buf()))
            .collect();
        Ok(digest_files(self.digest, files).await?.into())
    }

    /// Runs one validation pass over `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns a `ChecksumMismatchError` when digests changed in CI or the
    /// change was not confirmed. The fresh manifest is persisted before
    /// returning whenever it differs from the prior one.
    pub async fn validate(&self, snapshot: &Snapshot) -> Result<ValidationOutcome> {
        let fresh = self.fresh_manifest(snapshot).await?;
        let prior = ChecksumManifest::load(&self.manifest_path)?;

        let Some(prior) = prior else {
            tracing::info!(
                manifest = %self.manifest_path.display(),
                files = fresh.len(),
                "No checksum baseline, recording one"
            );
            fresh.save(&self.manifest_path)?;
            return Ok(ValidationOutcome::FirstRun { files: fresh.len() });
        };

        if prior == fresh {
            tracing::debug!(files = fresh.len(), "Checksums unchanged");
            return Ok(ValidationOutcome::Unchanged);
        }

        let differences = fresh.differences(&prior);
        self.report(&prior, &fresh, &differences);

        let accepted = if self.environment.is_ci() {
            AutoReject.confirm("").await?
        } else {
            self.confirmation
                .confirm("Checksums changed. Accept the new checksums?")
                .await?
        };

        fresh.save(&self.manifest_path)?;

        if accepted {
            tracing::warn!(changes = differences.len(), "Checksum changes accepted");
            Ok(ValidationOutcome::Confirmed { differences })
        } else {
            Err(ChecksumMismatchError::new(
                self.manifest_path.display().to_string(),
                differences,
            )
            .into())
        }
    }

    fn report(&self, prior: &ChecksumManifest, fresh: &ChecksumManifest, differences: &[String]) {
        tracing::warn!(
            manifest = %self.manifest_path.display(),
            environment = ?self.environment,
            changes = ?differences,
            "Checksums differ from the recorded manifest"
        );
        eprintln!("Previous checksums ({}):", self.manifest_path.display());
        eprint!("{}", prior.render());
        eprintln!("New checksums:");
        eprint!("{}", fresh.render());
    }
}

impl std::fmt::Debug for ChecksumValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumValidator")
            .field("manifest_path", &self.manifest_path)
            .field("patterns", &self.patterns)
            .field("digest", &self.digest)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Stage validating checksums of the current snapshot.
///
/// Settings not given explicitly come from the run configuration: the
/// manifest path, patterns, digest and CI signal variables. The snapshot
/// passes through unchanged.
pub struct ValidateChecksumsStage {
    name: String,
    patterns: Option<Vec<String>>,
    environment: Option<ExecutionEnvironment>,
    confirmation: Arc<dyn ConfirmationSource>,
}

impl ValidateChecksumsStage {
    /// Creates the stage with console confirmation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "validate-checksums".to_string(),
            patterns: None,
            environment: None,
            confirmation: Arc::new(InteractiveConsole::new()),
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the configured patterns.
    #[must_use]
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Forces an environment instead of detecting it.
    #[must_use]
    pub fn with_environment(mut self, environment: ExecutionEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets where confirmations come from.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationSource>) -> Self {
        self.confirmation = confirmation;
        self
    }

    fn validator(&self, ctx: &StageContext) -> Result<ChecksumValidator> {
        let config = ctx.config();
        let patterns = match &self.patterns {
            Some(raw) => {
                let overridden = config.clone().with_checksum_patterns(raw.clone());
                overridden.compiled_patterns()?
            }
            None => config.compiled_patterns()?,
        };
        let environment = self
            .environment
            .unwrap_or_else(|| CiDetector::new(config.ci_variables.clone()).detect());

        Ok(ChecksumValidator::new(config.manifest_path(), patterns)
            .with_digest(config.digest)
            .with_environment(environment)
            .with_confirmation(Arc::clone(&self.confirmation)))
    }
}

impl Default for ValidateChecksumsStage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValidateChecksumsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidateChecksumsStage")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ValidateChecksumsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let outcome = self.validator(ctx)?.validate(&input).await?;
        tracing::info!(stage = %self.name, outcome = ?outcome, "Checksums validated");
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ScriptedConfirmation;
    use crate::testing::snapshot_with;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn patterns() -> Vec<Regex> {
        vec![Regex::new(r"\.js$").unwrap()]
    }

    fn validator(dir: &TempDir, environment: ExecutionEnvironment) -> ChecksumValidator {
        ChecksumValidator::new(dir.path().join("checksums.json"), patterns())
            .with_environment(environment)
            .with_confirmation(Arc::new(ScriptedConfirmation::new(Vec::<String>::new())))
    }

    fn load(dir: &TempDir) -> Option<ChecksumManifest> {
        ChecksumManifest::load(&dir.path().join("checksums.json")).unwrap()
    }

    #[tokio::test]
    async fn test_first_run_records_matched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = snapshot_with(&[("lib/a.js", "a"), ("lib/b.js", "b"), ("README.md", "r")]).await;

        let outcome = validator(&dir, ExecutionEnvironment::ContinuousIntegration)
            .validate(&snapshot)
            .await
            .unwrap();

        assert_eq!(outcome, ValidationOutcome::FirstRun { files: 2 });
        let manifest = load(&dir).unwrap();
        let paths: Vec<&str> = manifest.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["lib/a.js", "lib/b.js"]);
    }

    #[tokio::test]
    async fn test_unchanged_does_not_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = snapshot_with(&[("lib/a.js", "a")]).await;
        let source = Arc::new(ScriptedConfirmation::new(["no"]));
        let v = validator(&dir, ExecutionEnvironment::Interactive).with_confirmation(source.clone());

        v.validate(&snapshot).await.unwrap();
        let before = std::fs::read_to_string(dir.path().join("checksums.json")).unwrap();
        let outcome = v.validate(&snapshot).await.unwrap();

        assert_eq!(outcome, ValidationOutcome::Unchanged);
        assert!(source.prompts().is_empty());
        let after = std::fs::read_to_string(dir.path().join("checksums.json")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_ci_mismatch_fails_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let v = validator(&dir, ExecutionEnvironment::ContinuousIntegration);

        v.validate(&snapshot_with(&[("lib/a.js", "v1")]).await).await.unwrap();
        let changed = snapshot_with(&[("lib/a.js", "v2")]).await;
        let err = v.validate(&changed).await.unwrap_err();

        assert!(err.is_checksum_mismatch());
        assert!(err.to_string().contains("lib/a.js"));
        assert_eq!(load(&dir).unwrap(), v.fresh_manifest(&changed).await.unwrap());
    }

    #[tokio::test]
    async fn test_interactive_affirmative_passes() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ScriptedConfirmation::new(["y"]));
        let v = validator(&dir, ExecutionEnvironment::Interactive).with_confirmation(source.clone());

        v.validate(&snapshot_with(&[("lib/a.js", "v1")]).await).await.unwrap();
        let outcome = v
            .validate(&snapshot_with(&[("lib/a.js", "v2")]).await)
            .await
            .unwrap();

        assert!(matches!(outcome, ValidationOutcome::Confirmed { ref differences } if differences.len() == 1));
        assert_eq!(source.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_interactive_other_answers_fail() {
        for answer in ["n", "", "maybe"] {
            let dir = tempfile::tempdir().unwrap();
            let v = validator(&dir, ExecutionEnvironment::Interactive)
                .with_confirmation(Arc::new(ScriptedConfirmation::new([answer])));

            v.validate(&snapshot_with(&[("lib/a.js", "v1")]).await).await.unwrap();
            let changed = snapshot_with(&[("lib/a.js", "v2")]).await;
            let err = v.validate(&changed).await.unwrap_err();

            assert!(err.is_checksum_mismatch(), "answer {answer:?}");
            assert_eq!(load(&dir).unwrap(), v.fresh_manifest(&changed).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_stage_reads_run_config() {
        let fixture = crate::testing::TestFixture::with_config(|c| {
            c.with_checksum_pattern(r"\.css$")
                .with_manifest_file("sums.json")
                .with_ci_variables(vec!["ASSETFLOW_TEST_NEVER_SET".to_string()])
        });
        let stage = ValidateChecksumsStage::new()
            .with_confirmation(Arc::new(ScriptedConfirmation::new(Vec::<String>::new())));
        let snapshot = snapshot_with(&[("site.css", "body{}"), ("app.js", "x")]).await;

        let out = stage.execute(&fixture.stage("validate"), snapshot).await.unwrap();

        assert_eq!(out.len(), 2);
        let manifest = ChecksumManifest::load(&fixture.root.path().join("sums.json"))
            .unwrap()
            .unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("site.css").is_some());
    }
}
