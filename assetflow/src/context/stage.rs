//! The view of a run handed to a single stage.

use super::RunContext;
use crate::config::PipelineConfig;
use crate::isolation::ContextCache;
use std::sync::Arc;

/// Execution context for one stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    run: Arc<RunContext>,
    stage_name: String,
}

impl StageContext {
    /// Creates a context for `stage_name` within `run`.
    #[must_use]
    pub fn new(run: Arc<RunContext>, stage_name: impl Into<String>) -> Self {
        Self {
            run,
            stage_name: stage_name.into(),
        }
    }

    /// Creates a context for a child stage of the same run.
    #[must_use]
    pub fn child(&self, stage_name: impl Into<String>) -> Self {
        Self::new(Arc::clone(&self.run), stage_name)
    }

    /// Returns the run this stage belongs to.
    #[must_use]
    pub fn run(&self) -> &Arc<RunContext> {
        &self.run
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        self.run.config()
    }

    /// Returns the run's isolated-context cache.
    #[must_use]
    pub fn contexts(&self) -> &ContextCache {
        self.run.contexts()
    }

    /// Emits an event tagged with this stage's name.
    pub fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(map) = data.as_object_mut() {
            map.entry("stage")
                .or_insert_with(|| serde_json::json!(self.stage_name));
        }
        self.run.emit(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_child_shares_run() {
        let sink = Arc::new(CollectingEventSink::new());
        let run = Arc::new(
            RunContext::new("assets", PipelineConfig::default()).with_event_sink(sink.clone()),
        );
        let parent = StageContext::new(run, "download");
        let child = parent.child("fetch");

        assert!(Arc::ptr_eq(parent.run(), child.run()));
        child.emit("stage.started", serde_json::json!({}));

        assert_eq!(sink.events()[0].1["stage"], "fetch");
    }
}
