//! Context management for pipeline execution.
//!
//! This module provides:
//! - The per-run context owning configuration, events and sandboxes
//! - The per-stage view handed to each stage
//! - The run history of committed snapshots

mod run;
mod stage;

pub use run::{RunContext, StageRecord, StageSummary};
pub use stage::StageContext;
