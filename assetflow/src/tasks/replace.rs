//! Regex replacement inside a tracked text file.

use crate::context::StageContext;
use crate::errors::{Result, ValidationError};
use crate::fileset::{Commit, Snapshot, StagingArea};
use crate::stages::Stage;
use async_trait::async_trait;
use regex::Regex;

/// Rewrites a tracked file by replacing every match of a regex.
///
/// The replacement supports `$1`-style capture references. The rewritten
/// file replaces the original under the same path and role.
#[derive(Debug, Clone)]
pub struct ReplaceInFileStage {
    name: String,
    path: String,
    pattern: Regex,
    replacement: String,
    require_match: bool,
}

impl ReplaceInFileStage {
    /// Creates a stage rewriting `path`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if `pattern` is not a valid regex.
    pub fn new(path: impl Into<String>, pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ValidationError::new(format!("invalid replace pattern '{pattern}': {e}"))
                .with_subjects(vec![pattern.to_string()])
        })?;
        Ok(Self {
            name: "replace".to_string(),
            path: path.into(),
            pattern,
            replacement: replacement.into(),
            require_match: false,
        })
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fails when the pattern matches nothing.
    #[must_use]
    pub fn requiring_match(mut self) -> Self {
        self.require_match = true;
        self
    }
}

#[async_trait]
impl Stage for ReplaceInFileStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let file = input.require(&self.path)?;
        let original = file.read_to_string().await?;

        let matches = self.pattern.find_iter(&original).count();
        if matches == 0 && self.require_match {
            return Err(ValidationError::new(format!(
                "pattern '{}' not found in {}",
                self.pattern,
                file.path()
            ))
            .with_subjects(vec![file.path().to_string()])
            .into());
        }

        let rewritten = self.pattern.replace_all(&original, self.replacement.as_str());
        let staging = StagingArea::new(file.role())?;
        staging.write(file.path(), rewritten.as_bytes()).await?;

        tracing::debug!(path = %file.path(), matches, "Replaced");
        input.commit(Commit::new().remove(file.path()).add(staging))
    }
}
