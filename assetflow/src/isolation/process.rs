//! Sandboxes that run each operation in a separate tool process.
//!
//! The protocol is deliberately small: the tool is started as
//! `<program> <args...> <operation>`, receives the JSON arguments on stdin,
//! and writes a JSON result to stdout. A non-zero exit status is a failure
//! and stderr becomes the error message. The dependency set is written to
//! a file in a per-sandbox work directory whose location is passed through
//! `ASSETFLOW_DEPENDENCIES`.

use super::dependency::DependencySet;
use super::sandbox::{Sandbox, SandboxFactory};
use crate::errors::{ExecutionError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment variable pointing at the sandbox's dependency list.
pub const DEPENDENCIES_ENV: &str = "ASSETFLOW_DEPENDENCIES";
/// Environment variable pointing at the sandbox's work directory.
pub const WORKDIR_ENV: &str = "ASSETFLOW_SANDBOX_DIR";

/// Builds sandboxes backed by an external tool process.
#[derive(Debug, Clone)]
pub struct ProcessSandboxFactory {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl ProcessSandboxFactory {
    /// Creates a factory for the given tool program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Adds a leading argument passed before the operation name.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable for the tool process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl SandboxFactory for ProcessSandboxFactory {
    async fn build(&self, dependencies: &DependencySet) -> Result<Arc<dyn Sandbox>> {
        let workdir = tempfile::Builder::new()
            .prefix("assetflow-sandbox-")
            .tempdir()?;
        let manifest = workdir.path().join("dependencies.json");
        tokio::fs::write(&manifest, serde_json::to_vec_pretty(dependencies)?).await?;

        tracing::info!(
            program = %self.program.display(),
            dependencies = %dependencies,
            "Built process sandbox"
        );

        Ok(Arc::new(ProcessSandbox {
            factory: self.clone(),
            manifest,
            workdir,
        }))
    }
}

struct ProcessSandbox {
    factory: ProcessSandboxFactory,
    manifest: PathBuf,
    workdir: TempDir,
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn invoke(&self, operation: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let fail = |message: String| ExecutionError::new(operation, message);

        let mut child = Command::new(&self.factory.program)
            .args(&self.factory.args)
            .arg(operation)
            .envs(self.factory.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(DEPENDENCIES_ENV, &self.manifest)
            .env(WORKDIR_ENV, self.workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(format!("failed to start {}: {e}", self.factory.program.display())))?;

        // stdin is fed while stdout drains so a chatty tool cannot fill its pipe and stall.
        let payload = serde_json::to_vec(&args)?;
        let stdin = child.stdin.take();
        let send = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (sent, output) = tokio::join!(send, child.wait_with_output());

        let output = output.map_err(|e| fail(format!("failed to wait for tool: {e}")))?;
        // A tool that exits without reading its input is judged by its exit status.
        if let Err(e) = sent {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(fail(format!("failed to send arguments: {e}")).into());
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("tool exited with {}: {}", output.status, stderr.trim())).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(stdout.trim())
            .map_err(|e| fail(format!("tool returned malformed JSON: {e}")).into())
    }
}
