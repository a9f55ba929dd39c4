//! Copying and moving tracked files.

use crate::context::StageContext;
use crate::errors::Result;
use crate::fileset::{normalize_path, Commit, Snapshot, StagingArea};
use crate::stages::Stage;
use async_trait::async_trait;

/// Copies one tracked file to a new path, keeping its role.
#[derive(Debug, Clone)]
pub struct CopyFileStage {
    name: String,
    from: String,
    to: String,
    remove_source: bool,
    overwrite: bool,
}

impl CopyFileStage {
    /// Creates a stage copying `from` to `to`.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: "copy".to_string(),
            from: from.into(),
            to: to.into(),
            remove_source: false,
            overwrite: false,
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Removes the source path, turning the copy into a move.
    #[must_use]
    pub fn moving(mut self) -> Self {
        self.remove_source = true;
        self
    }

    /// Replaces the destination if it is already tracked.
    #[must_use]
    pub fn overwriting(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

#[async_trait]
impl Stage for CopyFileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let source = input.require(&self.from)?;
        let target = normalize_path(&self.to)?;

        let staging = StagingArea::new(source.role())?;
        staging.copy_from(source.location(), &target).await?;

        let mut commit = Commit::new();
        if self.remove_source {
            commit = commit.remove(source.path());
        }
        if self.overwrite {
            commit = commit.remove(target.as_str());
        }
        tracing::debug!(from = %source.path(), to = %target, moved = self.remove_source, "Copied");
        input.commit(commit.add(staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::FileRole;
    use crate::testing::{assert_content, assert_paths, snapshot_with, snapshot_with_role, stage_context};

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let input = snapshot_with(&[("a.js", "a")]).await;
        let out = CopyFileStage::new("a.js", "dist/a.js")
            .execute(&stage_context("copy"), input)
            .await
            .unwrap();

        assert_paths(&out, &["a.js", "dist/a.js"]);
        assert_content(&out, "dist/a.js", "a").await;
    }

    #[tokio::test]
    async fn test_move_keeps_role() {
        let input = snapshot_with_role(&[("src/a.ts", "a")], FileRole::Source).await;
        let out = CopyFileStage::new("src/a.ts", "lib/a.ts")
            .moving()
            .execute(&stage_context("copy"), input)
            .await
            .unwrap();

        assert_paths(&out, &["lib/a.ts"]);
        assert_eq!(out.source_files().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_destination_conflicts_unless_overwriting() {
        let input = snapshot_with(&[("a.js", "new"), ("b.js", "old")]).await;

        let err = CopyFileStage::new("a.js", "b.js")
            .execute(&stage_context("copy"), input.clone())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let out = CopyFileStage::new("a.js", "b.js")
            .overwriting()
            .execute(&stage_context("copy"), input)
            .await
            .unwrap();
        assert_content(&out, "b.js", "new").await;
    }
}
