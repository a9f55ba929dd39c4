//! Pipeline building and execution.
//!
//! This module provides:
//! - Ordered, nestable composition of stages
//! - Pipeline builder with validation
//! - The runner threading a snapshot through every stage

mod builder;
mod runner;
mod sequence;

pub use builder::PipelineBuilder;
pub use runner::{Pipeline, PipelineResult};
pub use sequence::{compose, Sequence};
