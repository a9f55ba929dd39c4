//! Payloads for the operations known to run inside isolated contexts.
//!
//! Paths cross the sandbox boundary as plain strings so the same payloads
//! work for in-process and process-backed sandboxes.

use super::dependency::DependencySet;
use super::sandbox::Operation;
use crate::collaborators::{ArchiveReader, ArchiveSpec, LanguageLevel, TarArchiveReader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Decompress an archive into a directory.
pub const DECOMPRESS: &str = "decompress";
/// Minify a JavaScript file.
pub const MINIFY_JS: &str = "minify-js";
/// Minify a CSS file.
pub const MINIFY_CSS: &str = "minify-css";

/// Arguments of [`DECOMPRESS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompressRequest {
    /// Archive to read.
    pub source: String,
    /// Directory to extract into.
    pub destination: String,
    /// How the archive is encoded.
    pub format: ArchiveSpec,
}

/// Result of [`DECOMPRESS`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecompressResponse {
    /// Extracted paths relative to the destination.
    pub extracted: Vec<String>,
}

/// Arguments of [`MINIFY_JS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinifyJsRequest {
    /// File to minify.
    pub input: String,
    /// Where to write the minified output.
    pub output: String,
    /// Target language level.
    #[serde(default)]
    pub language_level: LanguageLevel,
}

/// Arguments of [`MINIFY_CSS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinifyCssRequest {
    /// File to minify.
    pub input: String,
    /// Where to write the minified output.
    pub output: String,
}

/// Builds the in-process [`DECOMPRESS`] operation on top of the tar reader.
#[must_use]
pub fn decompress_operation() -> Operation {
    Arc::new(
        |_deps: &DependencySet, args: serde_json::Value| -> anyhow::Result<serde_json::Value> {
            let request: DecompressRequest = serde_json::from_value(args)?;
            let extracted = TarArchiveReader::new().decompress(
                Path::new(&request.source),
                Path::new(&request.destination),
                request.format,
            )?;
            Ok(serde_json::to_value(DecompressResponse { extracted })?)
        },
    )
}
