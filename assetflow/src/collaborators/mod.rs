//! External collaborators the engine drives through narrow interfaces.
//!
//! Each collaborator can be used directly in this process or, when it
//! carries its own dependency footprint, through an isolated context.

mod archive;
mod http;
mod minify;
mod resolver;

pub use archive::{ArchiveFormat, ArchiveReader, ArchiveSpec, Compression, TarArchiveReader};
#[cfg(feature = "http")]
pub use http::ReqwestFetcher;
pub use http::HttpFetcher;
pub use minify::{minified_path, AssetKind, LanguageLevel, Minifier};
pub use resolver::{DependencyResolver, DirectoryResolver, ResolvedFile};

#[cfg(test)]
pub(crate) use archive::tests::write_tar_gz;
#[cfg(test)]
pub(crate) use archive::MockArchiveReader;
#[cfg(test)]
pub(crate) use http::MockHttpFetcher;
#[cfg(test)]
pub(crate) use minify::MockMinifier;
#[cfg(test)]
pub(crate) use resolver::MockDependencyResolver;

use crate::isolation::DependencySet;
use std::sync::Arc;

/// Where a collaborator runs.
pub enum Collaborator<T: ?Sized> {
    /// Called directly in this process.
    Local(Arc<T>),
    /// Called through the isolated context for these dependencies.
    Isolated(DependencySet),
}

impl<T: ?Sized> Clone for Collaborator<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Local(inner) => Self::Local(Arc::clone(inner)),
            Self::Isolated(deps) => Self::Isolated(deps.clone()),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Collaborator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local"),
            Self::Isolated(deps) => f.debug_tuple("Isolated").field(deps).finish(),
        }
    }
}
