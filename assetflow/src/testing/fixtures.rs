//! Fixtures for building runs and snapshots in tests.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::context::{RunContext, StageContext};
use crate::events::CollectingEventSink;
use crate::fileset::{Commit, FileRole, Snapshot, StagingArea};

/// A run wired to a collecting event sink and a temporary repository root.
#[derive(Debug)]
pub struct TestFixture {
    /// The run under test.
    pub run: Arc<RunContext>,
    /// Every event the run emitted.
    pub events: Arc<CollectingEventSink>,
    /// Temporary repository root.
    pub root: tempfile::TempDir,
}

impl TestFixture {
    /// Creates a fixture with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a fixture, letting `configure` adjust the configuration.
    /// The repository root always points at the fixture's temp directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn with_config(configure: impl FnOnce(PipelineConfig) -> PipelineConfig) -> Self {
        let root = tempfile::tempdir().expect("create temp repository root");
        let config = configure(PipelineConfig::default()).with_repository_root(root.path());
        let events = Arc::new(CollectingEventSink::new());
        let run = Arc::new(RunContext::new("test", config).with_event_sink(events.clone()));
        Self { run, events, root }
    }

    /// Returns a stage context for `stage_name` in this run.
    #[must_use]
    pub fn stage(&self, stage_name: &str) -> StageContext {
        StageContext::new(Arc::clone(&self.run), stage_name)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a stage context in a fresh run with default configuration.
#[must_use]
pub fn stage_context(stage_name: &str) -> StageContext {
    StageContext::new(
        Arc::new(RunContext::new("test", PipelineConfig::default())),
        stage_name,
    )
}

/// Builds a snapshot holding `files` as resources.
///
/// # Panics
///
/// Panics if the files cannot be staged or committed.
pub async fn snapshot_with(files: &[(&str, &str)]) -> Snapshot {
    snapshot_with_role(files, FileRole::Resource).await
}

/// Builds a snapshot holding `files` with the given role.
///
/// # Panics
///
/// Panics if the files cannot be staged or committed.
pub async fn snapshot_with_role(files: &[(&str, &str)], role: FileRole) -> Snapshot {
    let staging = StagingArea::new(role).expect("create staging area");
    for (path, contents) in files {
        staging.write(path, contents).await.expect("stage file");
    }
    Snapshot::new()
        .commit(Commit::new().add(staging))
        .expect("commit fixture files")
}
