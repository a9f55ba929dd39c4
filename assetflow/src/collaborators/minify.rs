//! Minifier collaborator and asset kind dispatch.

use crate::errors::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ECMAScript level the JS minifier should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageLevel {
    /// ECMAScript 3.
    Es3,
    /// ECMAScript 5.
    #[default]
    Es5,
    /// ECMAScript 2015.
    Es2015,
    /// ECMAScript 2020.
    Es2020,
    /// Latest supported syntax.
    EsNext,
}

/// Minifies JavaScript and CSS files.
///
/// The minification algorithm itself is supplied by the implementation.
#[cfg_attr(test, mockall::automock)]
pub trait Minifier: Send + Sync {
    /// Minifies a JavaScript file.
    fn minify_js(&self, input: &Path, output: &Path, level: LanguageLevel) -> Result<()>;

    /// Minifies a CSS file.
    fn minify_css(&self, input: &Path, output: &Path) -> Result<()>;
}

/// What kind of asset a file is, resolved once per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// A JavaScript source.
    JsAsset,
    /// A stylesheet.
    CssAsset,
    /// Anything else.
    Unsupported,
}

impl AssetKind {
    /// Classifies a path by its extension.
    #[must_use]
    pub fn of(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("js" | "mjs" | "cjs") => Self::JsAsset,
            Some("css") => Self::CssAsset,
            _ => Self::Unsupported,
        }
    }

    /// Returns the kind, or a `ValidationError` naming `path` when the
    /// kind is [`AssetKind::Unsupported`].
    pub fn require_supported(path: &str) -> Result<Self> {
        match Self::of(path) {
            Self::Unsupported => Err(ValidationError::new(format!(
                "cannot minify '{path}': only .js and .css files are supported"
            ))
            .with_subjects(vec![path.to_string()])
            .into()),
            kind => Ok(kind),
        }
    }
}

/// Returns the `name.min.ext` sibling path for `path`.
#[must_use]
pub fn minified_path(path: &str) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let renamed = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.min.{ext}"),
        _ => format!("{file}.min"),
    };
    match dir {
        Some(dir) => format!("{dir}/{renamed}"),
        None => renamed,
    }
}
