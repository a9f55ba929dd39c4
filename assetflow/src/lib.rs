//! # Assetflow
//!
//! Snapshot-based asset packaging pipelines.
//!
//! Assetflow runs ordered stages over an immutable set of tracked files:
//!
//! - **Snapshots**: every stage receives a snapshot and commits a new one;
//!   additions come from a private staging area, removals are explicit
//! - **Composition**: stages compose into sequences that behave exactly
//!   like their parts run inline
//! - **Isolated contexts**: third-party tooling runs in sandboxes cached
//!   per dependency set and built on first use
//! - **Checksum manifests**: digests of selected outputs are compared with
//!   a persisted manifest, and drift needs an explicit confirmation
//! - **Event-driven observability**: pipeline and stage events plus
//!   `tracing` records
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use assetflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("assets")
//!     .stage(Arc::new(download(
//!         DownloadOptions::new("lib", url, "lib.zip", fetcher)
//!             .with_checksum("900150983cd24fb0d6963f7d28e17f72")
//!             .unzip(),
//!     )))
//!     .stage(Arc::new(MinifyStage::new(Collaborator::Local(minifier))))
//!     .stage(Arc::new(ValidateChecksumsStage::new()))
//!     .with_config(PipelineConfig::load("assetflow.json")?)
//!     .build()?;
//!
//! let result = pipeline.run(Snapshot::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checksum;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod fileset;
pub mod isolation;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod tasks;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checksum::{
        ChecksumManifest, ChecksumValidator, ConfirmationSource, DigestAlgorithm,
        ExecutionEnvironment, ValidateChecksumsStage,
    };
    pub use crate::collaborators::{
        ArchiveReader, Collaborator, DependencyResolver, HttpFetcher, LanguageLevel, Minifier,
    };
    pub use crate::config::{FetchConfig, PipelineConfig};
    pub use crate::context::{RunContext, StageContext};
    pub use crate::errors::{AssetflowError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::fileset::{Commit, FileRole, Snapshot, StagingArea, TrackedFile};
    pub use crate::isolation::{ContextCache, DependencySet, DependencySpec, SandboxFactory};
    pub use crate::pipeline::{compose, Pipeline, PipelineBuilder, PipelineResult, Sequence};
    pub use crate::stages::{FnStage, MemoizedStage, Stage};
    pub use crate::tasks::{
        download, CollectDependencyFilesStage, ConcatStage, CopyFileStage, DownloadOptions,
        ExtractArchiveStage, FetchStage, MinifyStage, ReplaceInFileStage, RequireFilesStage,
        VerifyDigestStage,
    };
    pub use std::sync::Arc;
}
