//! Testing utilities for assetflow pipelines.
//!
//! This module provides:
//! - Mock stages
//! - Run and snapshot fixtures
//! - Assertions over snapshots and stage failures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_content, assert_failed_in, assert_not_tracked, assert_paths, assert_tracked,
};
pub use fixtures::{snapshot_with, snapshot_with_role, stage_context, TestFixture};
pub use mocks::{FailingStage, RecordingStage, WriteFilesStage};
