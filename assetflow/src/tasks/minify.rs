//! JavaScript and CSS minification.

use super::blocking;
use crate::collaborators::{minified_path, AssetKind, Collaborator, LanguageLevel, Minifier};
use crate::context::StageContext;
use crate::errors::{ExecutionError, Result, ValidationError};
use crate::fileset::{Commit, FileRole, Snapshot, StagingArea, TrackedFile};
use crate::isolation::ops::{MinifyCssRequest, MinifyJsRequest, MINIFY_CSS, MINIFY_JS};
use crate::stages::Stage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Selection {
    Paths(Vec<String>),
    Extensions(Vec<String>),
}

/// Writes a `name.min.ext` sibling for each selected asset.
///
/// By default every `.js` and `.css` file that is not already minified is
/// selected. Explicitly listed paths must be tracked and must be JS or CSS.
/// A previously produced `.min` sibling is replaced.
#[derive(Debug)]
pub struct MinifyStage {
    name: String,
    selection: Selection,
    language_level: LanguageLevel,
    minifier: Collaborator<dyn Minifier>,
}

impl MinifyStage {
    /// Creates a stage minifying all JS and CSS files with `minifier`.
    #[must_use]
    pub fn new(minifier: Collaborator<dyn Minifier>) -> Self {
        Self {
            name: "minify".to_string(),
            selection: Selection::Extensions(vec!["js".to_string(), "css".to_string()]),
            language_level: LanguageLevel::default(),
            minifier,
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Minifies exactly these paths.
    #[must_use]
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Selection::Paths(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Minifies every non-minified file with one of these extensions.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Selection::Extensions(extensions.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the JavaScript output level.
    #[must_use]
    pub fn with_language_level(mut self, level: LanguageLevel) -> Self {
        self.language_level = level;
        self
    }

    fn select<'a>(&self, input: &'a Snapshot) -> Result<Vec<&'a TrackedFile>> {
        match &self.selection {
            Selection::Paths(paths) => paths.iter().map(|p| input.require(p)).collect(),
            Selection::Extensions(extensions) => {
                let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
                Ok(input
                    .files_by_extension(&extensions)
                    .into_iter()
                    .filter(|f| !f.file_name().contains(".min."))
                    .collect())
            }
        }
    }

    async fn minify(
        &self,
        ctx: &StageContext,
        kind: AssetKind,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<()> {
        let level = self.language_level;
        match (&self.minifier, kind) {
            (_, AssetKind::Unsupported) => Err(ValidationError::new(format!(
                "cannot minify '{}'",
                input.display()
            ))
            .into()),
            (Collaborator::Local(minifier), AssetKind::JsAsset) => {
                let minifier = Arc::clone(minifier);
                blocking(MINIFY_JS, move || minifier.minify_js(&input, &output, level)).await
            }
            (Collaborator::Local(minifier), AssetKind::CssAsset) => {
                let minifier = Arc::clone(minifier);
                blocking(MINIFY_CSS, move || minifier.minify_css(&input, &output)).await
            }
            (Collaborator::Isolated(dependencies), AssetKind::JsAsset) => {
                let request = MinifyJsRequest {
                    input: input.to_string_lossy().into_owned(),
                    output: output.to_string_lossy().into_owned(),
                    language_level: level,
                };
                let _: serde_json::Value = ctx
                    .contexts()
                    .acquire(dependencies)
                    .call(MINIFY_JS, &request)
                    .await?;
                Ok(())
            }
            (Collaborator::Isolated(dependencies), AssetKind::CssAsset) => {
                let request = MinifyCssRequest {
                    input: input.to_string_lossy().into_owned(),
                    output: output.to_string_lossy().into_owned(),
                };
                let _: serde_json::Value = ctx
                    .contexts()
                    .acquire(dependencies)
                    .call(MINIFY_CSS, &request)
                    .await?;
                Ok(())
            }
        }
    }
}

fn operation_for(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::CssAsset => MINIFY_CSS,
        AssetKind::JsAsset | AssetKind::Unsupported => MINIFY_JS,
    }
}

#[async_trait]
impl Stage for MinifyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let selected = self.select(&input)?;
        if selected.is_empty() {
            tracing::debug!(stage = %self.name, "Nothing to minify");
            return Ok(input);
        }

        let staging = StagingArea::new(FileRole::Resource)?;
        let mut outputs = Vec::with_capacity(selected.len());
        for file in selected {
            let kind = AssetKind::require_supported(file.path())?;
            let relative = minified_path(file.path());
            let output = staging.path_for(&relative)?;
            self.minify(ctx, kind, file.location().to_path_buf(), output.clone())
                .await?;
            if !tokio::fs::try_exists(&output).await? {
                return Err(ExecutionError::new(
                    operation_for(kind),
                    format!("minifier reported success but wrote no '{relative}'"),
                )
                .into());
            }
            tracing::debug!(input = %file.path(), output = %relative, ?kind, "Minified");
            outputs.push(relative);
        }

        tracing::info!(stage = %self.name, files = outputs.len(), "Minified assets");
        input.commit(Commit::new().remove_all(outputs).add(staging))
    }
}
