//! Isolated execution contexts for third-party tooling.
//!
//! A context pairs a dependency set with a sandbox built from it. Contexts
//! are cached per run by value-equality of their dependency sets and built
//! lazily, on first invocation. Arguments and results cross the sandbox
//! boundary as plain JSON, so a sandbox may live in another process.

mod context;
mod dependency;
pub mod ops;
mod process;
mod sandbox;

pub use context::{ContextCache, IsolatedContext};
pub use dependency::{DependencySet, DependencySpec};
pub use process::ProcessSandboxFactory;
pub use sandbox::{InProcessSandboxFactory, Operation, Sandbox, SandboxFactory};
