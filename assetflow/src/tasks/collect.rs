//! Pulling files out of resolved dependencies.

use super::blocking;
use crate::collaborators::DependencyResolver;
use crate::context::StageContext;
use crate::errors::{NotFoundError, Result};
use crate::events::STAGE_REUSED;
use crate::fileset::{normalize_path, Commit, FileRole, Snapshot, StagingArea};
use crate::stages::{Fingerprint, Memo, Stage};
use async_trait::async_trait;
use std::sync::Arc;

/// Copies every dependency file ending with one of `suffixes` into the
/// snapshot, under an optional prefix.
///
/// Results are memoized on the resolver fingerprint, the suffixes, the
/// prefix and the content of the input snapshot, so an unchanged dependency
/// set is not walked again by the same stage instance. On reuse the files
/// collected earlier are committed onto the current input.
pub struct CollectDependencyFilesStage {
    name: String,
    suffixes: Vec<String>,
    prefix: Option<String>,
    resolver: Arc<dyn DependencyResolver>,
    memo: Memo,
}

impl CollectDependencyFilesStage {
    /// Creates a stage collecting files with `suffixes` from `resolver`.
    #[must_use]
    pub fn new<I, S>(suffixes: I, resolver: Arc<dyn DependencyResolver>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "collect-dependency-files".to_string(),
            suffixes: suffixes.into_iter().map(Into::into).collect(),
            prefix: None,
            resolver,
            memo: Memo::new(),
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Places collected files under `prefix`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn target_path(&self, relative: &str) -> Result<String> {
        match &self.prefix {
            Some(prefix) => normalize_path(&format!("{prefix}/{relative}")),
            None => normalize_path(relative),
        }
    }
}

impl std::fmt::Debug for CollectDependencyFilesStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectDependencyFilesStage")
            .field("name", &self.name)
            .field("suffixes", &self.suffixes)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for CollectDependencyFilesStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let description = serde_json::json!({
            "resolver": self.resolver.fingerprint(),
            "suffixes": self.suffixes,
            "prefix": self.prefix,
        });
        let fingerprint = Fingerprint::of(&description, &input).await?;
        if let Some(replayed) = self.memo.replay(&fingerprint, &input)? {
            tracing::debug!(stage = %self.name, %fingerprint, "Dependency set unchanged");
            ctx.emit(STAGE_REUSED, serde_json::json!({"fingerprint": fingerprint.as_str()}));
            return Ok(replayed);
        }

        let resolver = Arc::clone(&self.resolver);
        let suffixes = self.suffixes.clone();
        let resolved = blocking("resolve", move || resolver.list_matching_files(&suffixes)).await?;
        if resolved.is_empty() {
            return Err(NotFoundError::new("dependency files", self.suffixes.join(", ")).into());
        }

        let staging = StagingArea::new(FileRole::Resource)?;
        for file in &resolved {
            let target = self.target_path(&file.relative)?;
            staging.copy_from(&file.location, &target).await?;
        }
        tracing::info!(stage = %self.name, files = resolved.len(), "Collected dependency files");

        let output = input.commit(Commit::new().add(staging))?;
        self.memo.record(fingerprint, &input, &output);
        Ok(output)
    }
}
