//! Thin stages built on the snapshot, isolation and collaborator layers.
//!
//! Every task reads what it needs from its input snapshot, writes results
//! into a fresh staging area and commits, naming any paths it replaces.

mod collect;
mod concat;
mod copy;
mod download;
mod extract;
mod fetch;
mod minify;
mod replace;
mod require;
mod verify;

pub use collect::CollectDependencyFilesStage;
pub use concat::ConcatStage;
pub use copy::CopyFileStage;
pub use download::{download, DownloadOptions};
pub use extract::ExtractArchiveStage;
pub use fetch::FetchStage;
pub use minify::MinifyStage;
pub use replace::ReplaceInFileStage;
pub use require::RequireFilesStage;
pub use verify::VerifyDigestStage;

use crate::errors::{ExecutionError, Result};

/// Runs blocking collaborator work off the async runtime.
pub(crate) async fn blocking<T, F>(operation: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExecutionError::new(operation, format!("worker panicked: {e}")))?
}
