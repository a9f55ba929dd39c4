//! Immutable, versioned snapshots of the tracked file tree.

use super::staging::StagingArea;
use super::tracked::{normalize_path, FileRole, TrackedFile};
use crate::errors::{ConflictError, NotFoundError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// An instruction describing how a stage changes its input snapshot.
///
/// Removals are applied first, then every file under each staging area is
/// added. The staging areas are consumed, so their contents are only ever
/// visible through the snapshot the commit produces.
#[derive(Debug, Default)]
pub struct Commit {
    removals: BTreeSet<String>,
    additions: Vec<StagingArea>,
    retracked: Vec<TrackedFile>,
}

impl Commit {
    /// Creates an empty commit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path to remove.
    ///
    /// The path is normalized the same way tracked paths are; one that
    /// cannot be normalized can never be tracked and is dropped.
    #[must_use]
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if let Ok(normalized) = normalize_path(&path) {
            self.removals.insert(normalized);
        }
        self
    }

    /// Adds several paths to remove.
    #[must_use]
    pub fn remove_all<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        paths.into_iter().fold(self, |commit, path| commit.remove(path))
    }

    /// Adds a staging area whose files become tracked.
    #[must_use]
    pub fn add(mut self, area: StagingArea) -> Self {
        self.additions.push(area);
        self
    }

    /// Tracks files that already belong to another snapshot.
    pub(crate) fn retrack(mut self, files: impl IntoIterator<Item = TrackedFile>) -> Self {
        self.retracked.extend(files);
        self
    }

    /// Returns the paths to remove.
    #[must_use]
    pub fn removals(&self) -> &BTreeSet<String> {
        &self.removals
    }

    /// Returns true if the commit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty() && self.retracked.is_empty()
    }
}

/// Paths that differ between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Paths present only in the newer snapshot.
    pub added: Vec<String>,
    /// Paths present only in the older snapshot.
    pub removed: Vec<String>,
    /// Paths present in both but backed by different content sources.
    pub changed: Vec<String>,
}

impl SnapshotDiff {
    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// An immutable collection of tracked files.
///
/// Cloning a snapshot is cheap. Every commit yields a new value; the base
/// snapshot stays valid and keeps its own view of the file tree.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    revision: u64,
    files: Arc<BTreeMap<String, TrackedFile>>,
}

impl Snapshot {
    /// Creates an empty snapshot at revision zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from existing files.
    ///
    /// # Errors
    ///
    /// Returns a `ConflictError` if two files share a path.
    pub fn from_files(files: impl IntoIterator<Item = TrackedFile>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for file in files {
            if map.contains_key(file.path()) {
                return Err(ConflictError::new(file.path()).into());
            }
            map.insert(file.path().to_string(), file);
        }
        Ok(Self {
            revision: 0,
            files: Arc::new(map),
        })
    }

    /// Returns the revision number; every commit increments it.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the number of tracked files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if no files are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns true if the path is tracked.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Looks up a tracked file by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&TrackedFile> {
        match self.files.get(path) {
            Some(file) => Some(file),
            None => normalize_path(path)
                .ok()
                .and_then(|normalized| self.files.get(&normalized)),
        }
    }

    /// Looks up a tracked file, failing if it is absent.
    pub fn require(&self, path: &str) -> Result<&TrackedFile> {
        let normalized = normalize_path(path)?;
        self.files
            .get(&normalized)
            .ok_or_else(|| NotFoundError::tracked_file(normalized).into())
    }

    /// Returns all tracked paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Returns all tracked files in lexicographic path order.
    pub fn files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    /// Applies a commit, producing the next revision.
    ///
    /// Removal paths that are not tracked are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ConflictError` if an added path is already tracked and not
    /// removed by the same commit, or if two staging areas provide the
    /// same path.
    pub fn commit(&self, commit: Commit) -> Result<Self> {
        let Commit {
            removals,
            additions,
            retracked,
        } = commit;

        let mut files: BTreeMap<String, TrackedFile> = self
            .files
            .iter()
            .filter(|(path, _)| !removals.contains(*path))
            .map(|(path, file)| (path.clone(), file.clone()))
            .collect();

        let mut added = BTreeSet::new();
        let staged = additions
            .into_iter()
            .map(StagingArea::into_tracked_files)
            .collect::<Result<Vec<_>>>()?;
        for file in staged.into_iter().flatten().chain(retracked) {
            if files.contains_key(file.path()) {
                return Err(ConflictError::new(file.path()).into());
            }
            added.insert(file.path().to_string());
            files.insert(file.path().to_string(), file);
        }

        tracing::debug!(
            base_revision = self.revision,
            removed = removals.len(),
            added = added.len(),
            "Committed snapshot"
        );

        Ok(Self {
            revision: self.revision + 1,
            files: Arc::new(files),
        })
    }

    /// Returns files whose extension is in `exts`, in lexicographic path order.
    ///
    /// Extensions are compared case-insensitively and may be given with or
    /// without a leading dot.
    #[must_use]
    pub fn files_by_extension(&self, exts: &[&str]) -> Vec<&TrackedFile> {
        let wanted: BTreeSet<String> = exts
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.files
            .values()
            .filter(|file| file.extension().is_some_and(|ext| wanted.contains(&ext)))
            .collect()
    }

    /// Returns files whose path matches any pattern, in lexicographic path order.
    #[must_use]
    pub fn files_by_pattern(&self, patterns: &[Regex]) -> Vec<&TrackedFile> {
        self.files
            .values()
            .filter(|file| patterns.iter().any(|p| p.is_match(file.path())))
            .collect()
    }

    /// Returns files tagged as distributable output.
    #[must_use]
    pub fn output_files(&self) -> Vec<&TrackedFile> {
        self.files_with_role(FileRole::Resource)
    }

    /// Returns files tagged as sources.
    #[must_use]
    pub fn source_files(&self) -> Vec<&TrackedFile> {
        self.files_with_role(FileRole::Source)
    }

    fn files_with_role(&self, role: FileRole) -> Vec<&TrackedFile> {
        self.files.values().filter(|f| f.role() == role).collect()
    }

    /// Computes what changed from `older` to `self`.
    #[must_use]
    pub fn diff(&self, older: &Self) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();
        for (path, file) in self.files.iter() {
            match older.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(previous) if previous != file => diff.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.removed = older
            .files
            .keys()
            .filter(|path| !self.files.contains_key(*path))
            .cloned()
            .collect();
        diff
    }
}
