//! Immutable fileset model shared by every stage.
//!
//! This module provides:
//! - Tracked files with a repository-relative path and a role tag
//! - Immutable snapshots with commit, query, and diff operations
//! - Exclusively owned staging areas that feed commits

mod snapshot;
mod staging;
mod tracked;

pub use snapshot::{Commit, Snapshot, SnapshotDiff};
pub use staging::StagingArea;
pub use tracked::{normalize_path, FileRole, TrackedFile};
