//! Per-run state shared by every stage of one pipeline run.

use crate::collaborators::HttpFetcher;
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::fileset::Snapshot;
use crate::isolation::{ContextCache, InProcessSandboxFactory, SandboxFactory};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// One committed stage in the run history.
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// Name of the stage that produced the snapshot.
    pub stage: String,
    /// The snapshot the stage returned.
    pub snapshot: Snapshot,
    /// How long the stage took.
    pub duration_ms: f64,
}

/// Serializable summary of a [`StageRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    /// Stage name.
    pub stage: String,
    /// Revision of the produced snapshot.
    pub revision: u64,
    /// Number of tracked files after the stage.
    pub files: usize,
    /// Stage duration.
    pub duration_ms: f64,
}

impl From<&StageRecord> for StageSummary {
    fn from(record: &StageRecord) -> Self {
        Self {
            stage: record.stage.clone(),
            revision: record.snapshot.revision(),
            files: record.snapshot.len(),
            duration_ms: record.duration_ms,
        }
    }
}

/// State owned by a single pipeline run.
///
/// Holds the configuration, the isolated-context cache, the HTTP fetcher
/// and the event sink.
/// Dropping the run drops every cached context and, once the caller lets
/// go of the snapshots, every staging directory the run created.
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    pipeline_name: String,
    config: Arc<PipelineConfig>,
    sandbox_factory: Arc<dyn SandboxFactory>,
    contexts: ContextCache,
    event_sink: Arc<dyn EventSink>,
    fetcher: OnceLock<Arc<dyn HttpFetcher>>,
    history: RwLock<Vec<StageRecord>>,
}

impl RunContext {
    /// Creates a run with in-process sandboxes and no event sink.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, config: PipelineConfig) -> Self {
        let config = Arc::new(config);
        let sandbox_factory: Arc<dyn SandboxFactory> =
            Arc::new(InProcessSandboxFactory::with_builtin_operations());
        let event_sink: Arc<dyn EventSink> = Arc::new(NoOpEventSink);
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            pipeline_name: pipeline_name.into(),
            contexts: Self::cache(&config, &sandbox_factory, &event_sink),
            config,
            sandbox_factory,
            event_sink,
            fetcher: OnceLock::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    fn cache(
        config: &PipelineConfig,
        factory: &Arc<dyn SandboxFactory>,
        sink: &Arc<dyn EventSink>,
    ) -> ContextCache {
        ContextCache::new(Arc::clone(factory))
            .with_deadline(config.invoke_timeout())
            .with_event_sink(Arc::clone(sink))
    }

    /// Sets the factory used to build isolated contexts.
    #[must_use]
    pub fn with_sandbox_factory(mut self, factory: Arc<dyn SandboxFactory>) -> Self {
        self.sandbox_factory = factory;
        self.contexts = Self::cache(&self.config, &self.sandbox_factory, &self.event_sink);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self.contexts = Self::cache(&self.config, &self.sandbox_factory, &self.event_sink);
        self
    }

    /// Sets the fetcher used by stages that do not bring their own.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = OnceLock::from(fetcher);
        self
    }

    /// Returns the run's HTTP fetcher, building it from `config.fetch` on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an `ExecutionError` if no fetcher was supplied and none can
    /// be built from the configuration.
    pub fn fetcher(&self) -> Result<Arc<dyn HttpFetcher>> {
        if let Some(fetcher) = self.fetcher.get() {
            return Ok(Arc::clone(fetcher));
        }
        let built = configured_fetcher(&self.config)?;
        Ok(Arc::clone(self.fetcher.get_or_init(|| built)))
    }

    /// Returns the unique run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the name of the pipeline being run.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the run's isolated-context cache.
    #[must_use]
    pub fn contexts(&self) -> &ContextCache {
        &self.contexts
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits an event tagged with the run id and pipeline name.
    pub fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(map) = data.as_object_mut() {
            map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
            map.insert("pipeline".to_string(), serde_json::json!(self.pipeline_name));
        }
        self.event_sink.emit(event_type, data);
    }

    /// Appends a committed stage to the history.
    pub fn record(&self, stage: impl Into<String>, snapshot: Snapshot, duration_ms: f64) {
        self.history.write().push(StageRecord {
            stage: stage.into(),
            snapshot,
            duration_ms,
        });
    }

    /// Returns a copy of the history.
    #[must_use]
    pub fn history(&self) -> Vec<StageRecord> {
        self.history.read().clone()
    }

    /// Returns summaries of the history.
    #[must_use]
    pub fn summaries(&self) -> Vec<StageSummary> {
        self.history.read().iter().map(StageSummary::from).collect()
    }

    /// Returns the snapshot of the last successful stage.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.history.read().last().map(|r| r.snapshot.clone())
    }
}

#[cfg(feature = "http")]
fn configured_fetcher(config: &PipelineConfig) -> Result<Arc<dyn HttpFetcher>> {
    let fetcher = crate::collaborators::ReqwestFetcher::new(&config.fetch)?;
    tracing::debug!(timeout = ?config.fetch.timeout(), "Built HTTP fetcher");
    Ok(Arc::new(fetcher))
}

#[cfg(not(feature = "http"))]
fn configured_fetcher(_config: &PipelineConfig) -> Result<Arc<dyn HttpFetcher>> {
    Err(crate::errors::ExecutionError::new(
        "fetch",
        "no HTTP fetcher supplied and the `http` feature is disabled",
    )
    .into())
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pipeline_name", &self.pipeline_name)
            .field("contexts", &self.contexts)
            .field("history", &self.history.read().len())
            .finish()
    }
}
