//! Running a pipeline against an initial snapshot.

use super::Sequence;
use crate::collaborators::HttpFetcher;
use crate::config::PipelineConfig;
use crate::context::{RunContext, StageContext, StageSummary};
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED};
use crate::fileset::Snapshot;
use crate::isolation::SandboxFactory;
use crate::observability::StageTimer;
use crate::stages::Stage;
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Id of the run.
    pub run_id: Uuid,
    /// The final snapshot.
    pub snapshot: Snapshot,
    /// Every committed stage, in order.
    pub stages: Vec<StageSummary>,
    /// Total run duration.
    pub duration_ms: f64,
}

/// A validated, runnable pipeline.
#[derive(Clone)]
pub struct Pipeline {
    root: Sequence,
    config: PipelineConfig,
    sandbox_factory: Option<Arc<dyn SandboxFactory>>,
    fetcher: Option<Arc<dyn HttpFetcher>>,
    event_sink: Arc<dyn EventSink>,
}

impl Pipeline {
    pub(crate) fn new(root: Sequence) -> Self {
        Self {
            root,
            config: PipelineConfig::default(),
            sandbox_factory: None,
            fetcher: None,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the factory for isolated contexts.
    #[must_use]
    pub fn with_sandbox_factory(mut self, factory: Arc<dyn SandboxFactory>) -> Self {
        self.sandbox_factory = Some(factory);
        self
    }

    /// Sets the fetcher for fetch stages without one of their own.
    ///
    /// Without it every run builds a fetcher from `config.fetch`.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.root.name()
    }

    /// Returns the composed root stage.
    #[must_use]
    pub fn root(&self) -> &Sequence {
        &self.root
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates the context for a new run of this pipeline.
    #[must_use]
    pub fn create_run(&self) -> Arc<RunContext> {
        let mut run = RunContext::new(self.name(), self.config.clone())
            .with_event_sink(Arc::clone(&self.event_sink));
        if let Some(factory) = &self.sandbox_factory {
            run = run.with_sandbox_factory(Arc::clone(factory));
        }
        if let Some(fetcher) = &self.fetcher {
            run = run.with_fetcher(Arc::clone(fetcher));
        }
        Arc::new(run)
    }

    /// Runs the pipeline in a fresh run context.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure, wrapped with the failing stage's name.
    pub async fn run(&self, initial: Snapshot) -> Result<PipelineResult> {
        let run = self.create_run();
        self.run_in(&run, initial).await
    }

    /// Runs the pipeline in `run`.
    ///
    /// On failure the caller can still inspect `run`'s history, whose last
    /// entry is the last successfully committed snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure, wrapped with the failing stage's name.
    pub async fn run_in(&self, run: &Arc<RunContext>, initial: Snapshot) -> Result<PipelineResult> {
        let timer = StageTimer::start(self.name());
        let ctx = StageContext::new(Arc::clone(run), self.name());

        tracing::info!(
            pipeline = %self.name(),
            run_id = %run.run_id(),
            stages = self.root.len(),
            "Pipeline started"
        );
        run.emit(
            PIPELINE_STARTED,
            serde_json::json!({"stages": self.root.len(), "files": initial.len()}),
        );

        match self.root.execute(&ctx, initial).await {
            Ok(snapshot) => {
                let duration_ms = timer.elapsed_ms();
                tracing::info!(
                    pipeline = %self.name(),
                    files = snapshot.len(),
                    duration_ms,
                    "Pipeline completed"
                );
                run.emit(
                    PIPELINE_COMPLETED,
                    serde_json::json!({
                        "revision": snapshot.revision(),
                        "files": snapshot.len(),
                        "duration_ms": duration_ms,
                    }),
                );
                Ok(PipelineResult {
                    run_id: run.run_id(),
                    snapshot,
                    stages: run.summaries(),
                    duration_ms,
                })
            }
            Err(err) => {
                let err = err.in_stage(self.name());
                tracing::error!(pipeline = %self.name(), error = %err, "Pipeline failed");
                run.emit(
                    PIPELINE_FAILED,
                    serde_json::json!({
                        "error": err.to_dict(),
                        "duration_ms": timer.elapsed_ms(),
                    }),
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name())
            .field("stages", &self.root.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
