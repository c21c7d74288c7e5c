//! State module for tracking job progress
//!
//! This module provides the persisted job state and the in-memory controller
//! state machine.
//!
//! # Components
//!
//! - `JobState`: Durable progress of one job (page cursor, processed keys, ...)
//! - `JobConfig`: Parameters the job was started with, reused on resume
//! - `ControllerState`: Lifecycle of a single crawl invocation

mod job_state;
mod run_state;

// Re-export main types
pub use job_state::{ExecutionMode, JobConfig, JobState, ResumeInfo};
pub use run_state::ControllerState;
