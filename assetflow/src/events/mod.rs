//! Pipeline event sinks.
//!
//! Events are emitted by the engine at stage and run boundaries. They are
//! plain JSON payloads so sinks can forward them anywhere.

use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Emitted when a pipeline run starts.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Emitted when every stage of a run completed.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// Emitted when a run aborted.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// Emitted before a stage executes.
pub const STAGE_STARTED: &str = "stage.started";
/// Emitted after a stage produced its snapshot.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// Emitted when a stage reported an error.
pub const STAGE_FAILED: &str = "stage.failed";
/// Emitted when a memoized stage reused its previous result.
pub const STAGE_REUSED: &str = "stage.reused";
/// Emitted when an isolated context finished building its sandbox.
pub const CONTEXT_BUILT: &str = "context.built";

/// Receives events from the engine.
///
/// Implementations must not fail; a sink that cannot deliver an event
/// logs and drops it.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event_type: &str, data: serde_json::Value);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        }
    }
}

/// A sink that records events, for tests and run reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, serde_json::Value)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(STAGE_STARTED, serde_json::json!({}));
        LoggingEventSink::debug().emit(STAGE_COMPLETED, serde_json::json!({"stage": "copy"}));
    }

    #[test]
    fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(STAGE_STARTED, serde_json::json!({"stage": "a"}));
        sink.emit(STAGE_COMPLETED, serde_json::json!({"stage": "a"}));
        sink.emit(CONTEXT_BUILT, serde_json::json!({}));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(
            sink.event_types(),
            vec!["stage.started", "stage.completed", "context.built"]
        );
    }
}
