//! Archive extraction into the snapshot.

use super::blocking;
use crate::collaborators::{ArchiveReader, ArchiveSpec, Collaborator, TarArchiveReader};
use crate::context::StageContext;
use crate::errors::Result;
use crate::fileset::{normalize_path, Commit, FileRole, Snapshot, StagingArea};
use crate::isolation::ops::{DecompressRequest, DecompressResponse, DECOMPRESS};
use crate::stages::Stage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Extracts a tracked archive under a path prefix.
///
/// The encoding is inferred from the archive's file name. Extracted files
/// are tracked as resources; the archive itself is kept unless
/// [`removing_archive`](Self::removing_archive) is set.
#[derive(Debug)]
pub struct ExtractArchiveStage {
    name: String,
    archive: String,
    prefix: Option<String>,
    remove_archive: bool,
    reader: Collaborator<dyn ArchiveReader>,
}

impl ExtractArchiveStage {
    /// Creates a stage extracting `archive` at the snapshot root with the
    /// in-process tar reader.
    #[must_use]
    pub fn new(archive: impl Into<String>) -> Self {
        Self {
            name: "extract".to_string(),
            archive: archive.into(),
            prefix: None,
            remove_archive: false,
            reader: Collaborator::Local(Arc::new(TarArchiveReader::new())),
        }
    }

    /// Renames the stage.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Extracts under `prefix` instead of the snapshot root.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Removes the archive path in the same commit that adds its contents.
    #[must_use]
    pub fn removing_archive(mut self) -> Self {
        self.remove_archive = true;
        self
    }

    /// Replaces the archive reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Collaborator<dyn ArchiveReader>) -> Self {
        self.reader = reader;
        self
    }

    async fn decompress(
        &self,
        ctx: &StageContext,
        source: PathBuf,
        destination: PathBuf,
        spec: ArchiveSpec,
    ) -> Result<Vec<String>> {
        match &self.reader {
            Collaborator::Local(reader) => {
                let reader = Arc::clone(reader);
                blocking(DECOMPRESS, move || {
                    reader.decompress(&source, &destination, spec)
                })
                .await
            }
            Collaborator::Isolated(dependencies) => {
                let request = DecompressRequest {
                    source: source.to_string_lossy().into_owned(),
                    destination: destination.to_string_lossy().into_owned(),
                    format: spec,
                };
                let response: DecompressResponse = ctx
                    .contexts()
                    .acquire(dependencies)
                    .call(DECOMPRESS, &request)
                    .await?;
                Ok(response.extracted)
            }
        }
    }
}

#[async_trait]
impl Stage for ExtractArchiveStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let archive = input.require(&self.archive)?;
        let spec = ArchiveSpec::from_file_name(archive.file_name())?;

        let staging = StagingArea::new(FileRole::Resource)?;
        let destination = match &self.prefix {
            Some(prefix) => {
                let dir = staging.root().join(normalize_path(prefix)?);
                tokio::fs::create_dir_all(&dir).await?;
                dir
            }
            None => staging.root().to_path_buf(),
        };

        let extracted = self
            .decompress(ctx, archive.location().to_path_buf(), destination, spec)
            .await?;
        tracing::info!(
            archive = %archive.path(),
            entries = extracted.len(),
            "Extracted archive"
        );

        let mut commit = Commit::new();
        if self.remove_archive {
            commit = commit.remove(archive.path());
        }
        input.commit(commit.add(staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{write_tar_gz, MockArchiveReader};
    use crate::isolation::{DependencySet, DependencySpec};
    use crate::testing::{assert_content, assert_paths, snapshot_with, stage_context, TestFixture};

    fn archive_snapshot(name: &str, entries: &[(&str, &str)]) -> Snapshot {
        let staging = StagingArea::new(FileRole::Resource).unwrap();
        write_tar_gz(&staging.path_for(name).unwrap(), entries);
        Snapshot::new().commit(Commit::new().add(staging)).unwrap()
    }

    #[tokio::test]
    async fn test_extracts_tar_gz_under_prefix() {
        let input = archive_snapshot("pkg.tgz", &[("dist/a.js", "a"), ("dist/b.css", "b")]);
        let stage = ExtractArchiveStage::new("pkg.tgz")
            .with_prefix("vendor/pkg")
            .removing_archive();

        let out = stage.execute(&stage_context("extract"), input).await.unwrap();

        assert_paths(&out, &["vendor/pkg/dist/a.js", "vendor/pkg/dist/b.css"]);
        assert_content(&out, "vendor/pkg/dist/a.js", "a").await;
        assert_eq!(out.revision(), 2);
    }

    #[tokio::test]
    async fn test_keeps_archive_by_default() {
        let input = archive_snapshot("pkg.tar.gz", &[("a.js", "a")]);
        let out = ExtractArchiveStage::new("pkg.tar.gz")
            .execute(&stage_context("extract"), input)
            .await
            .unwrap();

        assert_paths(&out, &["a.js", "pkg.tar.gz"]);
    }

    #[tokio::test]
    async fn test_zip_goes_through_collaborator() {
        let mut reader = MockArchiveReader::new();
        reader
            .expect_decompress()
            .withf(|_, _, spec| *spec == ArchiveSpec::from_file_name("lib.zip").unwrap())
            .times(1)
            .returning(|_, destination, _| {
                std::fs::create_dir_all(destination.join("lib"))?;
                std::fs::write(destination.join("lib/core.js"), "core")?;
                Ok(vec!["lib/core.js".to_string()])
            });
        let input = snapshot_with(&[("lib.zip", "PK")]).await;
        let stage = ExtractArchiveStage::new("lib.zip")
            .removing_archive()
            .with_reader(Collaborator::Local(Arc::new(reader)));

        let out = stage.execute(&stage_context("extract"), input).await.unwrap();

        assert_paths(&out, &["lib/core.js"]);
    }

    #[tokio::test]
    async fn test_zip_with_tar_reader_fails() {
        let input = snapshot_with(&[("lib.zip", "PK")]).await;
        let err = ExtractArchiveStage::new("lib.zip")
            .execute(&stage_context("extract"), input)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::errors::AssetflowError::Execution(_)));
    }

    #[tokio::test]
    async fn test_unknown_archive_type() {
        let input = snapshot_with(&[("notes.txt", "hi")]).await;
        let err = ExtractArchiveStage::new("notes.txt")
            .execute(&stage_context("extract"), input)
            .await
            .unwrap_err();

        assert!(matches!(err, crate::errors::AssetflowError::Validation(_)));
    }

    #[tokio::test]
    async fn test_isolated_reader_uses_context_cache() {
        let fixture = TestFixture::new();
        let deps = DependencySet::new().with(DependencySpec::new("org.example", "untar", "1.0"));
        let input = archive_snapshot("pkg.tgz", &[("x.js", "x")]);
        let stage = ExtractArchiveStage::new("pkg.tgz").with_reader(Collaborator::Isolated(deps.clone()));

        let out = stage.execute(&fixture.stage("extract"), input).await.unwrap();

        assert!(out.contains("x.js"));
        let context = fixture.run.contexts().acquire(&deps);
        assert!(context.is_built());
        assert_eq!(context.invocation_count(), 1);
    }
}
