//! Checkpoint store trait and error types
//!
//! This module defines the trait interface for checkpoint backends. Backends
//! only implement `load` and `persist`; the state-changing operations are
//! provided on top of them so every backend enforces the same rules.

use crate::state::{JobConfig, JobState};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Trait for checkpoint backend implementations
///
/// Every mutating operation is applied to a copy of the state, persisted,
/// and only then committed to the caller's value. A failed persist leaves
/// both the durable and the in-memory state untouched.
pub trait CheckpointStore: Send {
    // ===== Backend Primitives =====

    /// Loads the persisted state
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing has been persisted yet
    /// * `Ok(Some(JobState))` - The last durably saved state
    /// * `Err(CheckpointError::Corrupt)` - Something is stored but unusable
    fn load(&self) -> CheckpointResult<Option<JobState>>;

    /// Writes the full state so that a crash leaves either the old or the
    /// new version, never a mix
    fn persist(&mut self, state: &JobState) -> CheckpointResult<()>;

    // ===== Job Lifecycle =====

    /// Creates and persists a new state positioned on the first page
    fn initialize(&mut self, target: &str, job_config: JobConfig) -> CheckpointResult<JobState> {
        let mut state = JobState::new(target, job_config);
        self.save(&mut state)?;
        tracing::debug!("Initialized checkpoint for {}", target);
        Ok(state)
    }

    /// Stamps `updated_at` and persists the state
    fn save(&mut self, state: &mut JobState) -> CheckpointResult<()> {
        let mut next = state.clone();
        next.touch();
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    /// Records that an item's record reached the sink
    ///
    /// Returns false without persisting if the key was already recorded.
    fn record_processed(&mut self, state: &mut JobState, key: &str) -> CheckpointResult<bool> {
        let mut next = state.clone();
        if !next.insert_processed(key)? {
            return Ok(false);
        }
        self.save(&mut next)?;
        *state = next;
        Ok(true)
    }

    /// Moves the page cursor to `page_cursor`, which must not be smaller
    /// than the current one
    fn advance_page(&mut self, state: &mut JobState, page_cursor: u32) -> CheckpointResult<()> {
        let mut next = state.clone();
        next.advance_to(page_cursor)?;
        self.save(&mut next)?;
        *state = next;
        Ok(())
    }

    /// Marks the job completed; fails if it already is
    fn mark_completed(&mut self, state: &mut JobState) -> CheckpointResult<()> {
        let mut next = state.clone();
        next.complete()?;
        self.save(&mut next)?;
        *state = next;
        Ok(())
    }
}
