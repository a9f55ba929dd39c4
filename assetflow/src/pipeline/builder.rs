//! Pipeline builder with validation.

use super::{Pipeline, Sequence};
use crate::collaborators::HttpFetcher;
use crate::config::PipelineConfig;
use crate::errors::{Result, ValidationError};
use crate::events::EventSink;
use crate::isolation::SandboxFactory;
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    /// The stages in execution order.
    sequence: Sequence,
    config: Option<PipelineConfig>,
    sandbox_factory: Option<Arc<dyn SandboxFactory>>,
    fetcher: Option<Arc<dyn HttpFetcher>>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            sequence: Sequence::new(name),
            config: None,
            sandbox_factory: None,
            fetcher: None,
            event_sink: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.sequence = self.sequence.then(stage);
        self
    }

    /// Appends several stages in order.
    #[must_use]
    pub fn stages<I>(self, stages: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Stage>>,
    {
        stages.into_iter().fold(self, Self::stage)
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the factory for isolated contexts.
    #[must_use]
    pub fn with_sandbox_factory(mut self, factory: Arc<dyn SandboxFactory>) -> Self {
        self.sandbox_factory = Some(factory);
        self
    }

    /// Sets the fetcher for fetch stages without one of their own.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Appends the stages of another builder after this one's.
    ///
    /// Settings of `self` win over those of `other`.
    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        let name = format!("{}+{}", self.name(), other.name());
        let mut composed = Self {
            sequence: Sequence::new(name),
            config: self.config.or(other.config),
            sandbox_factory: self.sandbox_factory.or(other.sandbox_factory),
            fetcher: self.fetcher.or(other.fetcher),
            event_sink: self.event_sink.or(other.event_sink),
        };
        for stage in self.sequence.stages().iter().chain(other.sequence.stages()) {
            composed = composed.stage(Arc::clone(stage));
        }
        composed
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the builder has no stages or two
    /// top-level stages share a name.
    pub fn build(self) -> Result<Pipeline> {
        if self.sequence.is_empty() {
            return Err(ValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name()
            ))
            .into());
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<String> = self
            .sequence
            .stages()
            .iter()
            .map(|s| s.name().to_string())
            .filter(|name| !seen.insert(name.clone()))
            .collect();
        if !duplicates.is_empty() {
            return Err(ValidationError::new(format!(
                "Pipeline '{}' has duplicate stage names: {}",
                self.name(),
                duplicates.join(", ")
            ))
            .with_subjects(duplicates)
            .into());
        }

        let mut pipeline = Pipeline::new(self.sequence);
        if let Some(config) = self.config {
            pipeline = pipeline.with_config(config);
        }
        if let Some(factory) = self.sandbox_factory {
            pipeline = pipeline.with_sandbox_factory(factory);
        }
        if let Some(fetcher) = self.fetcher {
            pipeline = pipeline.with_fetcher(fetcher);
        }
        if let Some(sink) = self.event_sink {
            pipeline = pipeline.with_event_sink(sink);
        }
        Ok(pipeline)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.sequence.name()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.sequence.len()
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("sequence", &self.sequence)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
