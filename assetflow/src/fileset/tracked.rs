//! Tracked file entries.

use crate::errors::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// How downstream consumers should treat a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    /// Distributable output.
    #[default]
    Resource,
    /// Input that needs further processing.
    Source,
}

impl std::fmt::Display for FileRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// A file tracked by a snapshot.
///
/// The bytes live at `location` on local disk. Files materialized from a
/// staging area keep that area's directory alive for as long as any
/// snapshot still references them.
#[derive(Clone)]
pub struct TrackedFile {
    path: String,
    location: PathBuf,
    role: FileRole,
    storage: Option<Arc<TempDir>>,
}

impl TrackedFile {
    /// Creates a tracked file backed by an existing file on disk.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if `path` is not a clean relative path.
    pub fn new(path: &str, location: impl Into<PathBuf>, role: FileRole) -> Result<Self> {
        Ok(Self {
            path: normalize_path(path)?,
            location: location.into(),
            role,
            storage: None,
        })
    }

    pub(crate) fn staged(
        path: String,
        location: PathBuf,
        role: FileRole,
        storage: Arc<TempDir>,
    ) -> Self {
        Self {
            path,
            location,
            role,
            storage: Some(storage),
        }
    }

    /// Returns the slash-separated, repository-relative path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the on-disk location of the file's bytes.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns the role tag.
    #[must_use]
    pub fn role(&self) -> FileRole {
        self.role
    }

    /// Returns the file name component of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns the lowercase extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| name[idx + 1..].to_ascii_lowercase())
    }

    /// Reads the whole file into memory.
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.location).await?)
    }

    /// Reads the whole file as UTF-8 text.
    pub async fn read_to_string(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.location).await?)
    }
}

impl std::fmt::Debug for TrackedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedFile")
            .field("path", &self.path)
            .field("location", &self.location)
            .field("role", &self.role)
            .finish()
    }
}

impl PartialEq for TrackedFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.location == other.location && self.role == other.role
    }
}

impl Eq for TrackedFile {}

/// Normalizes a repository-relative path to slash-separated form.
///
/// Backslashes are treated as separators and empty or `.` segments are
/// dropped. Absolute paths and `..` segments are rejected.
///
/// # Errors
///
/// Returns a `ValidationError` for empty, absolute, or escaping paths.
pub fn normalize_path(raw: &str) -> Result<String> {
    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || Path::new(raw).is_absolute() {
        return Err(ValidationError::new(format!("path must be relative: {raw}"))
            .with_subjects(vec![raw.to_string()])
            .into());
    }

    let mut segments = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(ValidationError::new(format!("path escapes its root: {raw}"))
                    .with_subjects(vec![raw.to_string()])
                    .into());
            }
        }
    }

    if segments.is_empty() {
        return Err(ValidationError::new("path is empty").into());
    }
    Ok(segments.join("/"))
}
