//! Sandbox traits and the in-process implementation.

use super::dependency::DependencySet;
use crate::errors::{ExecutionError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A built execution sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs a named operation with JSON arguments and returns its JSON result.
    async fn invoke(&self, operation: &str, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Builds sandboxes for dependency sets.
///
/// Building may be expensive; the context cache guarantees it happens at
/// most once per distinct dependency set in a run.
#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Builds a sandbox with the given extra dependencies.
    async fn build(&self, dependencies: &DependencySet) -> Result<Arc<dyn Sandbox>>;
}

/// An operation hosted by an [`InProcessSandboxFactory`].
///
/// Operations receive the sandbox's dependency set and run on a blocking
/// worker thread.
pub type Operation =
    Arc<dyn Fn(&DependencySet, serde_json::Value) -> anyhow::Result<serde_json::Value> + Send + Sync>;

/// A factory whose sandboxes run registered operations inside this process.
#[derive(Default)]
pub struct InProcessSandboxFactory {
    operations: HashMap<String, Operation>,
    builds: AtomicUsize,
}

impl InProcessSandboxFactory {
    /// Creates a factory with no operations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory hosting the built-in `decompress` operation.
    #[must_use]
    pub fn with_builtin_operations() -> Self {
        Self::new().with_operation(super::ops::DECOMPRESS, super::ops::decompress_operation())
    }

    /// Registers an operation.
    #[must_use]
    pub fn with_operation(mut self, name: impl Into<String>, operation: Operation) -> Self {
        self.operations.insert(name.into(), operation);
        self
    }

    /// Registers an operation from a closure.
    #[must_use]
    pub fn with_fn<F>(self, name: impl Into<String>, operation: F) -> Self
    where
        F: Fn(&DependencySet, serde_json::Value) -> anyhow::Result<serde_json::Value>
            + Send
            + Sync
            + 'static,
    {
        self.with_operation(name, Arc::new(operation))
    }

    /// Returns how many sandboxes this factory has built.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InProcessSandboxFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.operations.keys().collect();
        names.sort();
        f.debug_struct("InProcessSandboxFactory")
            .field("operations", &names)
            .field("builds", &self.build_count())
            .finish()
    }
}

#[async_trait]
impl SandboxFactory for InProcessSandboxFactory {
    async fn build(&self, dependencies: &DependencySet) -> Result<Arc<dyn Sandbox>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(dependencies = %dependencies, "Building in-process sandbox");
        Ok(Arc::new(InProcessSandbox {
            dependencies: dependencies.clone(),
            operations: self.operations.clone(),
        }))
    }
}

struct InProcessSandbox {
    dependencies: DependencySet,
    operations: HashMap<String, Operation>,
}

#[async_trait]
impl Sandbox for InProcessSandbox {
    async fn invoke(&self, operation: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let op = self
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| ExecutionError::new(operation, "operation is not available in this sandbox"))?;
        let dependencies = self.dependencies.clone();

        let outcome = tokio::task::spawn_blocking(move || op(&dependencies, args))
            .await
            .map_err(|e| ExecutionError::new(operation, format!("worker panicked: {e}")))?;

        outcome.map_err(|e| ExecutionError::new(operation, format!("{e:#}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_process_invoke() {
        let factory = InProcessSandboxFactory::new().with_fn("echo", |deps, args| {
            Ok(serde_json::json!({"deps": deps.len(), "args": args}))
        });

        let deps = DependencySet::parse(["x:y:1"]).unwrap();
        let sandbox = factory.build(&deps).await.unwrap();
        let result = sandbox.invoke("echo", serde_json::json!("hi")).await.unwrap();

        assert_eq!(result, serde_json::json!({"deps": 1, "args": "hi"}));
        assert_eq!(factory.build_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let factory = InProcessSandboxFactory::new();
        let sandbox = factory.build(&DependencySet::new()).await.unwrap();
        let err = sandbox.invoke("missing", serde_json::Value::Null).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_operation_error_becomes_execution_error() {
        let factory = InProcessSandboxFactory::new()
            .with_fn("boom", |_, _| Err(anyhow::anyhow!("tool exploded")));
        let sandbox = factory.build(&DependencySet::new()).await.unwrap();

        let err = sandbox.invoke("boom", serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, crate::errors::AssetflowError::Execution(_)));
        assert!(err.to_string().contains("tool exploded"));
    }
}
