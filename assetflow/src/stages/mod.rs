//! Stage trait and implementations.
//!
//! Stages are the fundamental units of work in an assetflow pipeline. A
//! stage takes the current snapshot and returns the next one; anything it
//! writes goes through a staging area and a commit.

mod memo;

pub use memo::{Fingerprint, Memo, MemoizedStage};

use crate::context::StageContext;
use crate::errors::Result;
use crate::fileset::Snapshot;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage execution context
    /// * `input` - The snapshot produced by the previous stage
    ///
    /// # Returns
    ///
    /// The snapshot handed to the next stage.
    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext, Snapshot) -> Result<Snapshot> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext, Snapshot) -> Result<Snapshot> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext, Snapshot) -> Result<Snapshot> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext, Snapshot) -> Result<Snapshot> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext, input: Snapshot) -> Result<Snapshot> {
        (self.func)(ctx, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stage_context;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("count", |_ctx, input: Snapshot| {
            assert!(input.is_empty());
            Ok(input)
        });

        assert_eq!(stage.name(), "count");

        let ctx = stage_context("count");
        let output = stage.execute(&ctx, Snapshot::new()).await.unwrap();
        assert_eq!(output.revision(), 0);
    }
}
