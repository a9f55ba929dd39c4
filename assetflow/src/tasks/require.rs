//! Guards that generated artifacts are present.

use crate::context::StageContext;
use crate::errors::{Result, ValidationError};
use crate::fileset::Snapshot;
use crate::stages::Stage;
use async_trait::async_trait;

/// Fails when any of the listed paths is not tracked.
#[derive(Debug, Clone)]
pub struct RequireFilesStage {
    name: String,
    paths: Vec<String>,
}

impl RequireFilesStage {
    /// Creates a stage requiring every path in `paths`.
    #[must_use]
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "require".to_string(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Stage for RequireFilesStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let missing: Vec<String> = self
            .paths
            .iter()
            .filter(|p| !input.contains(p))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::new(format!(
                "required artifacts missing: {}",
                missing.join(", ")
            ))
            .with_subjects(missing)
            .into());
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AssetflowError;
    use crate::testing::{snapshot_with, stage_context};

    #[tokio::test]
    async fn test_all_present_passes_through() {
        let input = snapshot_with(&[("app.min.js", "x")]).await;
        let out = RequireFilesStage::new(["app.min.js"])
            .execute(&stage_context("require"), input.clone())
            .await
            .unwrap();
        assert_eq!(out.revision(), input.revision());
    }

    #[tokio::test]
    async fn test_missing_lists_every_path() {
        let input = snapshot_with(&[("app.min.js", "x")]).await;
        let err = RequireFilesStage::new(["app.min.js", "site.min.css", "bundle.js"])
            .execute(&stage_context("require"), input)
            .await
            .unwrap_err();

        match err {
            AssetflowError::Validation(e) => {
                assert_eq!(e.subjects, vec!["site.min.css", "bundle.js"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
