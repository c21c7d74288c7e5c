use crate::checkpoint::CheckpointError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// How the job interacts with an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// An operator is present and may be asked to confirm anomalies
    #[default]
    Interactive,

    /// Nobody is watching; anomalies are resolved by policy
    Headless,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Headless => write!(f, "headless"),
        }
    }
}

/// Parameters a job was started with
///
/// These are stored in the checkpoint and reused verbatim on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Highest page index the job will visit
    pub page_limit: u32,

    /// Delay between requests (milliseconds)
    pub delay_ms: u64,

    /// Operator interaction mode
    pub mode: ExecutionMode,
}

impl JobConfig {
    /// Returns the inter-request delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Information needed to resume a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeInfo {
    pub page_cursor: u32,
    pub last_processed_key: Option<String>,
    pub processed_keys: BTreeSet<String>,
}

/// Durable progress of one job
///
/// Mutations are only performed through the checkpoint store, which persists
/// every change before the caller sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// Root address the job started from
    pub target: String,

    /// Current page index (1-based), never decreases
    pub page_cursor: u32,

    /// Last item completed on the page in progress
    pub last_processed_key: Option<String>,

    /// Every item key whose record was handed to the sink
    pub processed_keys: BTreeSet<String>,

    /// Always equal to `processed_keys.len()` after a save
    pub total_processed: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Terminal flag, set exactly once
    pub completed: bool,

    pub job_config: JobConfig,
}

impl JobState {
    /// Creates a fresh state positioned on the first page
    pub fn new(target: &str, job_config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            target: target.to_string(),
            page_cursor: 1,
            last_processed_key: None,
            processed_keys: BTreeSet::new(),
            total_processed: 0,
            started_at: now,
            updated_at: now,
            completed: false,
            job_config,
        }
    }

    /// Returns the position a new invocation should continue from
    pub fn resume_info(&self) -> ResumeInfo {
        ResumeInfo {
            page_cursor: self.page_cursor,
            last_processed_key: self.last_processed_key.clone(),
            processed_keys: self.processed_keys.clone(),
        }
    }

    /// Checks whether an item has already been handed to the sink
    pub fn is_processed(&self, key: &str) -> bool {
        self.processed_keys.contains(key)
    }

    /// Refreshes `updated_at` without ever moving it backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Adds an item key to the processed set
    ///
    /// Returns false (and changes nothing) if the key was already present.
    pub fn insert_processed(&mut self, key: &str) -> Result<bool, CheckpointError> {
        self.ensure_open("record a processed item")?;

        if !self.processed_keys.insert(key.to_string()) {
            return Ok(false);
        }

        self.total_processed += 1;
        self.last_processed_key = Some(key.to_string());
        Ok(true)
    }

    /// Moves the page cursor forward
    pub fn advance_to(&mut self, page_cursor: u32) -> Result<(), CheckpointError> {
        self.ensure_open("advance the page cursor")?;

        if page_cursor < self.page_cursor {
            return Err(CheckpointError::InvalidTransition(format!(
                "page cursor cannot move backwards ({} -> {})",
                self.page_cursor, page_cursor
            )));
        }

        if page_cursor > self.page_cursor {
            // The marker only ever refers to the page in progress
            self.last_processed_key = None;
        }
        self.page_cursor = page_cursor;
        Ok(())
    }

    /// Sets the terminal completed flag
    pub fn complete(&mut self) -> Result<(), CheckpointError> {
        self.ensure_open("mark the job completed")?;
        self.completed = true;
        Ok(())
    }

    /// Checks the invariants a loaded state must satisfy
    pub fn validate(&self) -> Result<(), String> {
        if self.target.is_empty() {
            return Err("target is empty".to_string());
        }

        if self.page_cursor < 1 {
            return Err(format!("page_cursor must be >= 1, got {}", self.page_cursor));
        }

        if self.total_processed != self.processed_keys.len() as u64 {
            return Err(format!(
                "total_processed ({}) does not match processed_keys ({})",
                self.total_processed,
                self.processed_keys.len()
            ));
        }

        if self.updated_at < self.started_at {
            return Err("updated_at precedes started_at".to_string());
        }

        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<(), CheckpointError> {
        if self.completed {
            return Err(CheckpointError::InvalidTransition(format!(
                "cannot {} on a completed job",
                action
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> JobConfig {
        JobConfig {
            page_limit: 2,
            delay_ms: 1500,
            mode: ExecutionMode::Headless,
        }
    }

    #[test]
    fn test_new_job_state() {
        let state = JobState::new("https://example.com/list", create_test_config());
        assert_eq!(state.page_cursor, 1);
        assert!(state.last_processed_key.is_none());
        assert!(state.processed_keys.is_empty());
        assert_eq!(state.total_processed, 0);
        assert!(!state.completed);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_insert_processed_is_idempotent() {
        let mut state = JobState::new("https://example.com/list", create_test_config());

        assert!(state.insert_processed("A").unwrap());
        assert!(!state.insert_processed("A").unwrap());

        assert_eq!(state.total_processed, 1);
        assert_eq!(state.last_processed_key.as_deref(), Some("A"));
        assert!(state.is_processed("A"));
    }

    #[test]
    fn test_advance_rejects_backwards_cursor() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        state.advance_to(3).unwrap();

        let result = state.advance_to(2);
        assert!(matches!(result, Err(CheckpointError::InvalidTransition(_))));
        assert_eq!(state.page_cursor, 3);
    }

    #[test]
    fn test_advance_clears_page_marker() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        state.insert_processed("A").unwrap();

        state.advance_to(1).unwrap();
        assert_eq!(state.last_processed_key.as_deref(), Some("A"));

        state.advance_to(2).unwrap();
        assert!(state.last_processed_key.is_none());
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        state.complete().unwrap();

        assert!(state.complete().is_err());
        assert!(state.insert_processed("A").is_err());
        assert!(state.advance_to(2).is_err());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        let future = Utc::now() + chrono::Duration::hours(1);
        state.updated_at = future;

        state.touch();
        assert_eq!(state.updated_at, future);
    }

    #[test]
    fn test_validate_detects_counter_mismatch() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        state.processed_keys.insert("A".to_string());

        assert!(state.validate().is_err());
    }

    #[test]
    fn test_resume_info() {
        let mut state = JobState::new("https://example.com/list", create_test_config());
        state.insert_processed("A").unwrap();

        let info = state.resume_info();
        assert_eq!(info.page_cursor, 1);
        assert_eq!(info.last_processed_key.as_deref(), Some("A"));
        assert!(info.processed_keys.contains("A"));
    }
}
