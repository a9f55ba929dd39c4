//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::context::StageContext;
use crate::errors::{AssetflowError, ExecutionError, Result};
use crate::fileset::{Commit, FileRole, Snapshot, StagingArea};
use crate::stages::Stage;

/// A pass-through stage that records every invocation.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    revisions: Mutex<Vec<u64>>,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revisions: Mutex::new(Vec::new()),
            log: None,
        }
    }

    /// Also appends the stage name to a log shared between stages.
    #[must_use]
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.revisions.lock().len()
    }

    /// Returns the input revision seen by each call.
    #[must_use]
    pub fn seen_revisions(&self) -> Vec<u64> {
        self.revisions.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        self.revisions.lock().push(input.revision());
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        Ok(input)
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
}

impl FailingStage {
    /// Creates a stage failing with an `ExecutionError`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: "Intentional failure".to_string(),
        }
    }

    /// Sets the failure message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, _input: Snapshot) -> Result<Snapshot> {
        Err(AssetflowError::from(ExecutionError::new(&self.name, &self.message)))
    }
}

/// A stage that adds fixed files to the snapshot.
#[derive(Debug)]
pub struct WriteFilesStage {
    name: String,
    files: Vec<(String, String)>,
    role: FileRole,
}

impl WriteFilesStage {
    /// Creates a stage writing `files` as resources.
    #[must_use]
    pub fn new<I, P, C>(name: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            name: name.into(),
            files: files
                .into_iter()
                .map(|(p, c)| (p.into(), c.into()))
                .collect(),
            role: FileRole::Resource,
        }
    }
}

#[async_trait]
impl Stage for WriteFilesStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let staging = StagingArea::new(self.role)?;
        for (path, contents) in &self.files {
            staging.write(path, contents).await?;
        }
        input.commit(Commit::new().add(staging))
    }
}
