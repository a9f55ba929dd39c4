//! Fetching a URL into the snapshot.

use crate::collaborators::HttpFetcher;
use crate::context::StageContext;
use crate::errors::Result;
use crate::fileset::{normalize_path, Commit, FileRole, Snapshot, StagingArea};
use crate::stages::Stage;
use async_trait::async_trait;
use std::sync::Arc;

/// Downloads a URL to a tracked path.
///
/// The target must not be tracked yet; fetching over an existing path is
/// a conflict. Without a fetcher of its own the stage uses the run's.
pub struct FetchStage {
    name: String,
    url: String,
    target: String,
    role: FileRole,
    fetcher: Option<Arc<dyn HttpFetcher>>,
}

impl FetchStage {
    /// Creates a stage fetching `url` into `target`.
    #[must_use]
    pub fn new(url: impl Into<String>, target: impl Into<String>, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
            ..Self::configured(url, target)
        }
    }

    /// Creates a stage fetching with the run's configured fetcher.
    #[must_use]
    pub fn configured(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: "fetch".to_string(),
            url: url.into(),
            target: target.into(),
            role: FileRole::Resource,
            fetcher: None,
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Tags the fetched file with `role`.
    #[must_use]
    pub fn with_role(mut self, role: FileRole) -> Self {
        self.role = role;
        self
    }
}

impl std::fmt::Debug for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStage")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let target = normalize_path(&self.target)?;
        let fetcher = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => ctx.run().fetcher()?,
        };
        let staging = StagingArea::new(self.role)?;
        let destination = staging.path_for(&target)?;

        fetcher.fetch(&self.url, &destination).await?;
        tracing::info!(url = %self.url, target = %target, "Fetched");

        input.commit(Commit::new().add(staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockHttpFetcher;
    use crate::config::PipelineConfig;
    use crate::context::RunContext;
    use crate::errors::ExecutionError;
    use crate::testing::{assert_content, snapshot_with, stage_context};

    fn fetcher_writing(body: &'static str) -> MockHttpFetcher {
        let mut fetcher = MockHttpFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url, _| url == "https://cdn.example.com/app.js")
            .times(1)
            .returning(move |_, dest| {
                std::fs::write(dest, body)?;
                Ok(())
            });
        fetcher
    }

    #[tokio::test]
    async fn test_fetch_adds_file() {
        let stage = FetchStage::new(
            "https://cdn.example.com/app.js",
            "js/app.js",
            Arc::new(fetcher_writing("console.log(1)")),
        )
        .with_role(FileRole::Source);

        let out = stage
            .execute(&stage_context("fetch"), Snapshot::new())
            .await
            .unwrap();

        assert_content(&out, "js/app.js", "console.log(1)").await;
        assert_eq!(out.source_files().len(), 1);
    }

    #[tokio::test]
    async fn test_configured_stage_uses_run_fetcher() {
        let run = Arc::new(
            RunContext::new("assets", PipelineConfig::default())
                .with_fetcher(Arc::new(fetcher_writing("from run"))),
        );
        let stage = FetchStage::configured("https://cdn.example.com/app.js", "js/app.js");

        let out = stage
            .execute(&StageContext::new(run, "fetch"), Snapshot::new())
            .await
            .unwrap();

        assert_content(&out, "js/app.js", "from run").await;
    }

    #[tokio::test]
    async fn test_fetch_conflicts_with_tracked_path() {
        let stage = FetchStage::new(
            "https://cdn.example.com/app.js",
            "js/app.js",
            Arc::new(fetcher_writing("new")),
        );
        let input = snapshot_with(&[("js/app.js", "old")]).await;

        let err = stage.execute(&stage_context("fetch"), input).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let mut fetcher = MockHttpFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|url, _| Err(ExecutionError::new("fetch", format!("{url}: 404")).into()));
        let stage = FetchStage::new("https://cdn.example.com/gone.js", "gone.js", Arc::new(fetcher));

        let err = stage
            .execute(&stage_context("fetch"), Snapshot::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
