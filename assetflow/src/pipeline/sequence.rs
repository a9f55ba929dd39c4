//! Ordered composition of stages.

use crate::context::StageContext;
use crate::errors::Result;
use crate::events::{STAGE_COMPLETED, STAGE_FAILED, STAGE_STARTED};
use crate::fileset::Snapshot;
use crate::observability::StageTimer;
use crate::stages::Stage;
use async_trait::async_trait;
use std::sync::Arc;

/// Stages run one after another, each seeing its predecessor's snapshot.
///
/// A sequence is itself a stage, so sequences nest; running a nested
/// sequence produces the same snapshot as running its parts inline.
#[derive(Debug, Clone)]
pub struct Sequence {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
}

impl Sequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn then(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the child stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns the number of child stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the sequence has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Composes `stages` into a single stage named `name`.
pub fn compose<I>(name: impl Into<String>, stages: I) -> Sequence
where
    I: IntoIterator<Item = Arc<dyn Stage>>,
{
    Sequence {
        name: name.into(),
        stages: stages.into_iter().collect(),
    }
}

/// Runs one stage under `parent`, with events, timing and history.
///
/// Errors come back wrapped with the stage's name unless an inner stage
/// already claimed them.
pub(crate) async fn run_stage(
    parent: &StageContext,
    stage: &dyn Stage,
    input: Snapshot,
) -> Result<Snapshot> {
    let ctx = parent.child(stage.name());
    let timer = StageTimer::start(stage.name());

    tracing::info!(stage = %stage.name(), revision = input.revision(), "Stage started");
    ctx.emit(
        STAGE_STARTED,
        serde_json::json!({"input_revision": input.revision(), "files": input.len()}),
    );

    match stage.execute(&ctx, input).await {
        Ok(output) => {
            let duration_ms = timer.elapsed_ms();
            tracing::info!(
                stage = %stage.name(),
                revision = output.revision(),
                files = output.len(),
                duration_ms,
                "Stage completed"
            );
            ctx.emit(
                STAGE_COMPLETED,
                serde_json::json!({
                    "revision": output.revision(),
                    "files": output.len(),
                    "duration_ms": duration_ms,
                }),
            );
            ctx.run().record(stage.name(), output.clone(), duration_ms);
            Ok(output)
        }
        Err(err) => {
            let err = err.in_stage(stage.name());
            tracing::error!(stage = %stage.name(), error = %err, "Stage failed");
            ctx.emit(
                STAGE_FAILED,
                serde_json::json!({
                    "error": err.to_dict(),
                    "duration_ms": timer.elapsed_ms(),
                }),
            );
            Err(err)
        }
    }
}

#[async_trait]
impl Stage for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        let mut snapshot = input;
        for stage in &self.stages {
            snapshot = run_stage(ctx, stage.as_ref(), snapshot).await?;
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_failed_in, assert_paths, FailingStage, RecordingStage, TestFixture, WriteFilesStage,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn writer(name: &str, path: &str) -> Arc<dyn Stage> {
        Arc::new(WriteFilesStage::new(name, [(path, name)]))
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seq = compose(
            "all",
            ["a", "b", "c"].map(|n| -> Arc<dyn Stage> {
                Arc::new(RecordingStage::new(n).with_log(Arc::clone(&log)))
            }),
        );
        let fixture = TestFixture::new();

        seq.execute(&fixture.stage("all"), Snapshot::new()).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_nesting_is_associative() {
        let flat = compose(
            "flat",
            [writer("a", "a.js"), writer("b", "b.js"), writer("c", "c.js")],
        );
        let left = compose(
            "left",
            [
                Arc::new(compose("ab", [writer("a", "a.js"), writer("b", "b.js")])) as Arc<dyn Stage>,
                writer("c", "c.js"),
            ],
        );
        let right = compose(
            "right",
            [
                writer("a", "a.js"),
                Arc::new(compose("bc", [writer("b", "b.js"), writer("c", "c.js")])) as Arc<dyn Stage>,
            ],
        );

        let fixture = TestFixture::new();
        for seq in [flat, left, right] {
            let out = seq.execute(&fixture.stage("root"), Snapshot::new()).await.unwrap();
            assert_paths(&out, &["a.js", "b.js", "c.js"]);
            assert_eq!(out.revision(), 3);
        }
    }

    #[tokio::test]
    async fn test_innermost_failure_is_reported() {
        let seq = compose(
            "outer",
            [
                writer("a", "a.js"),
                Arc::new(compose(
                    "inner",
                    [Arc::new(FailingStage::new("explode")) as Arc<dyn Stage>],
                )) as Arc<dyn Stage>,
                writer("never", "never.js"),
            ],
        );
        let fixture = TestFixture::new();

        let err = seq
            .execute(&fixture.stage("outer"), Snapshot::new())
            .await
            .unwrap_err();

        assert_failed_in(&err, "explode");
        let last = fixture.run.last_snapshot().unwrap();
        assert_paths(&last, &["a.js"]);
        assert!(fixture.events.event_types().contains(&STAGE_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_emits_stage_events() {
        let seq = compose("one", [writer("a", "a.js")]);
        let fixture = TestFixture::new();

        seq.execute(&fixture.stage("one"), Snapshot::new()).await.unwrap();

        assert_eq!(
            fixture.events.event_types(),
            vec![STAGE_STARTED.to_string(), STAGE_COMPLETED.to_string()]
        );
        let completed = &fixture.events.events_of_type(STAGE_COMPLETED)[0].1;
        assert_eq!(completed["stage"], "a");
        assert_eq!(completed["files"], 1);
    }
}
