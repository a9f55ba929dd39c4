//! Lazily built, cached isolated contexts.

use super::dependency::DependencySet;
use super::sandbox::{Sandbox, SandboxFactory};
use crate::errors::{ExecutionError, Result};
use crate::events::{EventSink, CONTEXT_BUILT};
use crate::observability::StageTimer;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// A sandbox description plus its lazily built sandbox.
///
/// The sandbox is built on the first [`invoke`](Self::invoke), so a stage
/// that acquires a context but aborts before using it never pays for the
/// build. Once built, the sandbox is shared read-only by every later
/// invocation in the run.
pub struct IsolatedContext {
    dependencies: DependencySet,
    factory: Arc<dyn SandboxFactory>,
    sandbox: OnceCell<Arc<dyn Sandbox>>,
    deadline: Option<Duration>,
    invocations: AtomicUsize,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl IsolatedContext {
    /// Creates an unbuilt context.
    #[must_use]
    pub fn new(
        dependencies: DependencySet,
        factory: Arc<dyn SandboxFactory>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            dependencies,
            factory,
            sandbox: OnceCell::new(),
            deadline,
            invocations: AtomicUsize::new(0),
            event_sink: None,
        }
    }

    /// Reports sandbox builds to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Returns the extra dependencies of this context.
    #[must_use]
    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// Returns true once the sandbox has been built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.sandbox.initialized()
    }

    /// Returns how many invocations have been made.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    async fn sandbox(&self) -> Result<&Arc<dyn Sandbox>> {
        self.sandbox
            .get_or_try_init(|| async {
                tracing::info!(dependencies = %self.dependencies, "Building isolated context");
                let timer = StageTimer::start("build");
                let sandbox = self.factory.build(&self.dependencies).await?;
                if let Some(sink) = &self.event_sink {
                    sink.emit(
                        CONTEXT_BUILT,
                        serde_json::json!({
                            "dependencies": self.dependencies.to_string(),
                            "fingerprint": self.dependencies.fingerprint(),
                            "duration_ms": timer.elapsed_ms(),
                        }),
                    );
                }
                Ok::<_, crate::errors::AssetflowError>(sandbox)
            })
            .await
    }

    /// Runs an operation inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns an `ExecutionError` if the sandbox cannot be built, the
    /// operation fails, or the deadline elapses.
    pub async fn invoke(&self, operation: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let call = async {
            let sandbox = self.sandbox().await?;
            sandbox.invoke(operation, args).await
        };

        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, call).await.map_err(|_| {
                ExecutionError::new(
                    operation,
                    format!("timed out after {:.1}s", deadline.as_secs_f64()),
                )
            })?,
            None => call.await,
        };

        if let Err(ref err) = result {
            tracing::warn!(operation, error = %err, "Isolated invocation failed");
        }
        result
    }

    /// Runs an operation with typed arguments and result.
    pub async fn call<A, R>(&self, operation: &str, args: &A) -> Result<R>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let value = self.invoke(operation, serde_json::to_value(args)?).await?;
        serde_json::from_value(value).map_err(|e| {
            ExecutionError::new(operation, format!("unexpected result shape: {e}")).into()
        })
    }
}

impl std::fmt::Debug for IsolatedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedContext")
            .field("dependencies", &self.dependencies)
            .field("built", &self.is_built())
            .field("invocations", &self.invocation_count())
            .finish()
    }
}

/// Per-run cache of isolated contexts keyed by dependency set value.
pub struct ContextCache {
    factory: Arc<dyn SandboxFactory>,
    deadline: Option<Duration>,
    event_sink: Option<Arc<dyn EventSink>>,
    contexts: DashMap<DependencySet, Arc<IsolatedContext>>,
}

impl ContextCache {
    /// Creates an empty cache that builds sandboxes with `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn SandboxFactory>) -> Self {
        Self {
            factory,
            deadline: None,
            event_sink: None,
            contexts: DashMap::new(),
        }
    }

    /// Reports sandbox builds of every context to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Sets the deadline applied to every invocation.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Returns the context for `dependencies`, creating it if needed.
    ///
    /// Equal dependency sets always yield the same context.
    pub fn acquire(&self, dependencies: &DependencySet) -> Arc<IsolatedContext> {
        let entry = self
            .contexts
            .entry(dependencies.clone())
            .or_insert_with(|| {
                tracing::debug!(dependencies = %dependencies, "Registered isolated context");
                let context = IsolatedContext::new(
                    dependencies.clone(),
                    Arc::clone(&self.factory),
                    self.deadline,
                );
                Arc::new(match &self.event_sink {
                    Some(sink) => context.with_event_sink(Arc::clone(sink)),
                    None => context,
                })
            });
        Arc::clone(entry.value())
    }

    /// Returns the number of distinct contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns true if no context was acquired yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("contexts", &self.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolation::InProcessSandboxFactory;

    fn factory() -> Arc<InProcessSandboxFactory> {
        Arc::new(
            InProcessSandboxFactory::new()
                .with_fn("version", |deps, _| Ok(serde_json::json!(deps.to_string())))
                .with_fn("sleep", |_, _| {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(serde_json::Value::Null)
                }),
        )
    }

    #[tokio::test]
    async fn test_equal_sets_share_one_build() {
        let factory = factory();
        let cache = ContextCache::new(factory.clone());

        let first = cache.acquire(&DependencySet::parse(["a:b:1", "c:d:2"]).unwrap());
        let second = cache.acquire(&DependencySet::parse(["c:d:2", "a:b:1"]).unwrap());
        assert!(Arc::ptr_eq(&first, &second));

        first.invoke("version", serde_json::Value::Null).await.unwrap();
        second.invoke("version", serde_json::Value::Null).await.unwrap();

        assert_eq!(factory.build_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(first.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_sets_build_separately() {
        let factory = factory();
        let cache = ContextCache::new(factory.clone());

        let a = cache.acquire(&DependencySet::parse(["a:b:1"]).unwrap());
        let b = cache.acquire(&DependencySet::parse(["a:b:2"]).unwrap());
        a.invoke("version", serde_json::Value::Null).await.unwrap();
        b.invoke("version", serde_json::Value::Null).await.unwrap();

        assert_eq!(factory.build_count(), 2);
    }

    #[tokio::test]
    async fn test_build_is_lazy() {
        let factory = factory();
        let cache = ContextCache::new(factory.clone());

        let ctx = cache.acquire(&DependencySet::new());
        assert!(!ctx.is_built());
        assert_eq!(factory.build_count(), 0);

        ctx.invoke("version", serde_json::Value::Null).await.unwrap();
        assert!(ctx.is_built());
    }

    #[tokio::test]
    async fn test_deadline_becomes_execution_error() {
        let cache = ContextCache::new(factory()).with_deadline(Some(Duration::from_millis(20)));
        let ctx = cache.acquire(&DependencySet::new());

        let err = ctx.invoke("sleep", serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, crate::errors::AssetflowError::Execution(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_typed_call() {
        let cache = ContextCache::new(factory());
        let ctx = cache.acquire(&DependencySet::parse(["x:y:3"]).unwrap());

        let rendered: String = ctx.call("version", &()).await.unwrap();
        assert_eq!(rendered, "[x:y:3]");
    }

    #[tokio::test]
    async fn test_build_emits_event_once() {
        let sink = Arc::new(crate::events::CollectingEventSink::new());
        let cache = ContextCache::new(factory()).with_event_sink(sink.clone());
        let ctx = cache.acquire(&DependencySet::new());

        ctx.invoke("version", serde_json::Value::Null).await.unwrap();
        ctx.invoke("version", serde_json::Value::Null).await.unwrap();

        assert_eq!(sink.event_types(), vec![CONTEXT_BUILT.to_string()]);
    }
}
