//! Streaming content digests.

use crate::errors::{ExecutionError, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const BUFFER_SIZE: usize = 64 * 1024;

/// Content digest used for checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// 128-bit MD5.
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the length of a hex digest for this algorithm.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    /// Digests everything `reader` yields, in fixed-size chunks.
    pub fn digest_reader(self, reader: impl Read) -> Result<String> {
        match self {
            Self::Md5 => stream::<Md5>(reader),
            Self::Sha256 => stream::<Sha256>(reader),
        }
    }

    /// Digests a file without loading it into memory at once.
    pub fn digest_file(self, path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| {
            ExecutionError::new("digest", format!("cannot read {}: {e}", path.display()))
        })?;
        self.digest_reader(file)
    }

    /// Digests an in-memory buffer.
    #[must_use]
    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            Self::Md5 => hex::encode(Md5::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

fn stream<D: Digest>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digests many files on blocking worker threads.
///
/// Files are digested in parallel; the result is keyed and ordered by the
/// tracked path regardless of completion order.
pub async fn digest_files(
    algorithm: DigestAlgorithm,
    files: Vec<(String, PathBuf)>,
) -> Result<BTreeMap<String, String>> {
    let tasks = files.into_iter().map(|(path, location)| async move {
        let digest = tokio::task::spawn_blocking(move || algorithm.digest_file(&location))
            .await
            .map_err(|e| ExecutionError::new("digest", format!("worker panicked: {e}")))??;
        Ok::<_, crate::errors::AssetflowError>((path, digest))
    });

    let digests = futures::future::try_join_all(tasks).await?;
    Ok(digests.into_iter().collect())
}
