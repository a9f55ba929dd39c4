//! Archive decompression collaborator.

use crate::errors::{ExecutionError, Result, ValidationError};
use crate::fileset::normalize_path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Component, Path};

/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// A zip container.
    Zip,
    /// A tar container.
    Tar,
}

/// Stream compression wrapped around the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No outer compression.
    #[default]
    None,
    /// Gzip.
    Gzip,
}

/// Full description of how an archive is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    /// Outer compression.
    pub compression: Compression,
    /// Container format.
    pub archive: ArchiveFormat,
}

impl ArchiveSpec {
    /// Infers the encoding from a file name.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for names without a known archive suffix.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        let spec = if lower.ends_with(".zip") || lower.ends_with(".jar") {
            Self {
                compression: Compression::None,
                archive: ArchiveFormat::Zip,
            }
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self {
                compression: Compression::Gzip,
                archive: ArchiveFormat::Tar,
            }
        } else if lower.ends_with(".tar") {
            Self {
                compression: Compression::None,
                archive: ArchiveFormat::Tar,
            }
        } else {
            return Err(ValidationError::new(format!("unrecognized archive type: {name}"))
                .with_subjects(vec![name.to_string()])
                .into());
        };
        Ok(spec)
    }
}

/// Decompresses archives into a destination directory.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveReader: Send + Sync {
    /// Extracts `source` into `destination` and returns the extracted
    /// relative paths, slash-separated and sorted.
    fn decompress(&self, source: &Path, destination: &Path, spec: ArchiveSpec) -> Result<Vec<String>>;
}

/// Reads tar archives, optionally gzip-compressed.
///
/// Only regular files and directories are accepted; absolute paths and
/// `..` components are rejected before anything is written.
#[derive(Debug, Clone, Copy)]
pub struct TarArchiveReader {
    max_entries: usize,
    max_total_bytes: u64,
}

impl Default for TarArchiveReader {
    fn default() -> Self {
        Self {
            max_entries: 50_000,
            max_total_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl TarArchiveReader {
    /// Creates a reader with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn unpack<R: Read>(&self, reader: R, destination: &Path) -> Result<Vec<String>> {
        let op = "decompress";
        let mut archive = tar::Archive::new(reader);
        let mut extracted = Vec::new();
        let mut total_bytes: u64 = 0;

        let entries = archive
            .entries()
            .map_err(|e| ExecutionError::new(op, format!("failed to read tar entries: {e}")))?;
        for (index, entry) in entries.enumerate() {
            if index >= self.max_entries {
                return Err(ExecutionError::new(
                    op,
                    format!("archive exceeds {} entries", self.max_entries),
                )
                .into());
            }
            let mut entry =
                entry.map_err(|e| ExecutionError::new(op, format!("failed to read tar entry: {e}")))?;

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }
            if !entry_type.is_file() {
                return Err(ExecutionError::new(
                    op,
                    format!("unsupported tar entry type: {entry_type:?}"),
                )
                .into());
            }

            let path = entry
                .path()
                .map_err(|e| ExecutionError::new(op, format!("failed to read tar entry path: {e}")))?
                .into_owned();
            if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(ExecutionError::new(
                    op,
                    format!("unsafe tar path: {}", path.display()),
                )
                .into());
            }

            total_bytes = total_bytes.saturating_add(entry.header().size().unwrap_or(0));
            if total_bytes > self.max_total_bytes {
                return Err(ExecutionError::new(op, "archive exceeds size limit").into());
            }

            let relative = normalize_path(&path.to_string_lossy())?;
            let target = destination.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry
                .unpack(&target)
                .map_err(|e| ExecutionError::new(op, format!("failed to unpack {relative}: {e}")))?;
            extracted.push(relative);
        }

        extracted.sort();
        Ok(extracted)
    }
}

impl ArchiveReader for TarArchiveReader {
    fn decompress(&self, source: &Path, destination: &Path, spec: ArchiveSpec) -> Result<Vec<String>> {
        if spec.archive != ArchiveFormat::Tar {
            return Err(ExecutionError::new(
                "decompress",
                format!("{:?} archives are not supported by the tar reader", spec.archive),
            )
            .into());
        }

        fs::create_dir_all(destination)?;
        let file = fs::File::open(source)?;
        match spec.compression {
            Compression::None => self.unpack(file, destination),
            Compression::Gzip => self.unpack(flate2::read::GzDecoder::new(file), destination),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a gzip-compressed tar with the given entries.
    pub(crate) fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_spec_from_file_name() {
        assert_eq!(
            ArchiveSpec::from_file_name("lib.zip").unwrap().archive,
            ArchiveFormat::Zip
        );
        let tgz = ArchiveSpec::from_file_name("pkg-1.0.TGZ").unwrap();
        assert_eq!(tgz.archive, ArchiveFormat::Tar);
        assert_eq!(tgz.compression, Compression::Gzip);
        assert_eq!(
            ArchiveSpec::from_file_name("a.tar").unwrap().compression,
            Compression::None
        );
        assert!(ArchiveSpec::from_file_name("notes.txt").is_err());
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.tgz");
        write_tar_gz(&archive, &[("package/dist/b.js", "b"), ("package/dist/a.js", "a")]);

        let out = dir.path().join("out");
        let extracted = TarArchiveReader::new()
            .decompress(&archive, &out, ArchiveSpec::from_file_name("pkg.tgz").unwrap())
            .unwrap();

        assert_eq!(extracted, vec!["package/dist/a.js", "package/dist/b.js"]);
        assert_eq!(
            fs::read_to_string(out.join("package/dist/a.js")).unwrap(),
            "a"
        );
    }

    #[test]
    fn test_entry_limit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("many.tar.gz");
        write_tar_gz(&archive, &[("a", "1"), ("b", "2"), ("c", "3")]);

        let result = TarArchiveReader::new().with_max_entries(2).decompress(
            &archive,
            &dir.path().join("out"),
            ArchiveSpec::from_file_name("many.tar.gz").unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zip_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let result = TarArchiveReader::new().decompress(
            &dir.path().join("lib.zip"),
            dir.path(),
            ArchiveSpec::from_file_name("lib.zip").unwrap(),
        );
        assert!(matches!(
            result.unwrap_err(),
            crate::errors::AssetflowError::Execution(_)
        ));
    }
}
