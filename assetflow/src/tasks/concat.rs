//! Concatenation of tracked files into one bundle.

use crate::context::StageContext;
use crate::errors::{NotFoundError, Result};
use crate::fileset::{normalize_path, Commit, FileRole, Snapshot, StagingArea};
use crate::stages::Stage;
use async_trait::async_trait;

/// Joins every file with the given extensions, in path order, into `output`.
///
/// The output path itself is never an input, so re-running the stage
/// rebuilds the bundle instead of nesting it.
#[derive(Debug, Clone)]
pub struct ConcatStage {
    name: String,
    extensions: Vec<String>,
    output: String,
    separator: String,
}

impl ConcatStage {
    /// Creates a stage bundling files with `extensions` into `output`.
    #[must_use]
    pub fn new<I, S>(extensions: I, output: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "concat".to_string(),
            extensions: extensions.into_iter().map(Into::into).collect(),
            output: output.into(),
            separator: "\n".to_string(),
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the text placed between files.
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

#[async_trait]
impl Stage for ConcatStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let output = normalize_path(&self.output)?;
        let extensions: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        let parts: Vec<_> = input
            .files_by_extension(&extensions)
            .into_iter()
            .filter(|f| f.path() != output)
            .collect();
        if parts.is_empty() {
            return Err(NotFoundError::new(
                "files to concatenate",
                format!("*.{{{}}}", self.extensions.join(",")),
            )
            .into());
        }

        let mut bundle = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            if index > 0 {
                bundle.extend_from_slice(self.separator.as_bytes());
            }
            bundle.extend_from_slice(&part.read().await?);
        }

        let staging = StagingArea::new(FileRole::Resource)?;
        staging.write(&output, &bundle).await?;
        tracing::debug!(output = %output, parts = parts.len(), bytes = bundle.len(), "Concatenated");

        input.commit(Commit::new().remove(output.as_str()).add(staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AssetflowError;
    use crate::testing::{assert_content, snapshot_with, stage_context};

    #[tokio::test]
    async fn test_concat_in_path_order() {
        let input = snapshot_with(&[("b.js", "B"), ("a.js", "A"), ("c.css", "C")]).await;
        let stage = ConcatStage::new(["js"], "bundle.js");

        let out = stage.execute(&stage_context("concat"), input).await.unwrap();

        assert_content(&out, "bundle.js", "A\nB").await;
    }

    #[tokio::test]
    async fn test_rerun_excludes_previous_bundle() {
        let input = snapshot_with(&[("a.js", "A"), ("b.js", "B")]).await;
        let stage = ConcatStage::new(["js"], "b.js").with_separator(";");

        let out = stage.execute(&stage_context("concat"), input).await.unwrap();
        let again = stage.execute(&stage_context("concat"), out).await.unwrap();

        assert_content(&again, "b.js", "A").await;
    }

    #[tokio::test]
    async fn test_no_inputs() {
        let input = snapshot_with(&[("a.css", "A")]).await;
        let err = ConcatStage::new(["js", "mjs"], "bundle.js")
            .execute(&stage_context("concat"), input)
            .await
            .unwrap_err();

        assert!(matches!(err, AssetflowError::NotFound(_)));
        assert!(err.to_string().contains("*.{js,mjs}"));
    }
}
