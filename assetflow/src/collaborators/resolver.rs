//! Dependency resolution collaborator.

use crate::errors::Result;
use crate::isolation::DependencySet;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use walkdir::WalkDir;

/// A file found inside a resolved dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedFile {
    /// Slash-separated path relative to the dependency root.
    pub relative: String,
    /// Location of the bytes on local disk.
    pub location: PathBuf,
}

/// Lists files found inside the host's resolved dependencies.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyResolver: Send + Sync {
    /// Returns every file whose name ends with one of `suffixes`.
    fn list_matching_files(&self, suffixes: &[String]) -> Result<Vec<ResolvedFile>>;

    /// Returns a fingerprint of the resolved dependency set.
    ///
    /// Equal fingerprints promise equal `list_matching_files` results.
    fn fingerprint(&self) -> String;
}

/// Resolver over already unpacked dependency directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
    dependencies: DependencySet,
}

impl DirectoryResolver {
    /// Creates a resolver with no roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unpacked dependency root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Declares which dependencies the roots were unpacked from.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DependencySet) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl DependencyResolver for DirectoryResolver {
    fn list_matching_files(&self, suffixes: &[String]) -> Result<Vec<ResolvedFile>> {
        let mut found = Vec::new();
        for root in &self.roots {
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if !suffixes.iter().any(|s| name.ends_with(s.as_str())) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                found.push(ResolvedFile {
                    relative,
                    location: entry.path().to_path_buf(),
                });
            }
        }
        found.sort();
        Ok(found)
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dependencies.fingerprint().as_bytes());
        for root in &self.roots {
            hasher.update(root.to_string_lossy().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("jquery/dist")).unwrap();
        fs::write(dir.path().join("jquery/dist/jquery.js"), "j").unwrap();
        fs::write(dir.path().join("jquery/dist/jquery.min.map"), "m").unwrap();
        fs::write(dir.path().join("angular.js"), "a").unwrap();

        let resolver = DirectoryResolver::new().with_root(dir.path());
        let files = resolver.list_matching_files(&[".js".to_string()]).unwrap();

        let relative: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["angular.js", "jquery/dist/jquery.js"]);
    }

    #[test]
    fn test_fingerprint_tracks_dependencies() {
        let a = DirectoryResolver::new()
            .with_root("/deps")
            .with_dependencies(DependencySet::parse(["org.webjars:jquery:3.7.1"]).unwrap());
        let b = DirectoryResolver::new()
            .with_root("/deps")
            .with_dependencies(DependencySet::parse(["org.webjars:jquery:3.7.0"]).unwrap());

        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
