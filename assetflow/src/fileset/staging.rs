//! Stage-scoped staging areas.

use super::tracked::{normalize_path, FileRole, TrackedFile};
use crate::errors::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// A private scratch directory a stage writes its additions into.
///
/// Staging areas are neither `Clone` nor shareable: the stage that creates
/// one owns it until it hands it to a [`Commit`](super::Commit), which
/// consumes it. Every regular file under the root becomes a candidate
/// tracked file tagged with the area's role.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    role: FileRole,
}

impl StagingArea {
    /// Creates a staging area under the system temp directory.
    pub fn new(role: FileRole) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("assetflow-stage-").tempdir()?;
        Ok(Self { dir, role })
    }

    /// Creates a staging area under a specific parent directory.
    pub fn new_in(parent: impl AsRef<Path>, role: FileRole) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("assetflow-stage-")
            .tempdir_in(parent)?;
        Ok(Self { dir, role })
    }

    /// Returns the staging root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the role given to files committed from this area.
    #[must_use]
    pub fn role(&self) -> FileRole {
        self.role
    }

    /// Returns the on-disk path for a relative path, creating parent directories.
    pub fn path_for(&self, relative: &str) -> Result<PathBuf> {
        let normalized = normalize_path(relative)?;
        let target = self.dir.path().join(&normalized);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(target)
    }

    /// Writes bytes to a relative path inside the area.
    pub async fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let target = self.path_for(relative)?;
        tokio::fs::write(&target, contents).await?;
        Ok(target)
    }

    /// Copies an existing file into the area.
    pub async fn copy_from(&self, source: &Path, relative: &str) -> Result<PathBuf> {
        let target = self.path_for(relative)?;
        tokio::fs::copy(source, &target).await?;
        Ok(target)
    }

    /// Lists the relative paths currently staged, sorted.
    pub fn staged_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(self.dir.path()).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(self.dir.path())
                .map_err(std::io::Error::other)?;
            paths.push(normalize_path(&relative.to_string_lossy())?);
        }
        paths.sort();
        Ok(paths)
    }

    /// Consumes the area, returning tracked files that keep its storage alive.
    pub(crate) fn into_tracked_files(self) -> Result<Vec<TrackedFile>> {
        let paths = self.staged_paths()?;
        let role = self.role;
        let storage = Arc::new(self.dir);
        Ok(paths
            .into_iter()
            .map(|path| {
                let location = storage.path().join(&path);
                TrackedFile::staged(path, location, role, Arc::clone(&storage))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_list() {
        let area = StagingArea::new(FileRole::Resource).unwrap();
        area.write("js/b.js", "b").await.unwrap();
        area.write("js/a.js", "a").await.unwrap();
        area.write("index.html", "<html>").await.unwrap();

        assert_eq!(
            area.staged_paths().unwrap(),
            vec!["index.html", "js/a.js", "js/b.js"]
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let area = StagingArea::new(FileRole::Resource).unwrap();
        assert!(area.write("../outside.js", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_tracked_files_outlive_area() {
        let area = StagingArea::new(FileRole::Source).unwrap();
        area.write("a.ts", "let a = 1;").await.unwrap();

        let files = area.into_tracked_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].role(), FileRole::Source);
        assert_eq!(files[0].read_to_string().await.unwrap(), "let a = 1;");
    }

    #[tokio::test]
    async fn test_storage_reclaimed_when_dropped() {
        let area = StagingArea::new(FileRole::Resource).unwrap();
        let root = area.root().to_path_buf();
        area.write("x.js", "x").await.unwrap();

        let files = area.into_tracked_files().unwrap();
        assert!(root.exists());
        drop(files);
        assert!(!root.exists());
    }
}
