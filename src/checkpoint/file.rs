//! JSON file checkpoint implementation
//!
//! This module provides a file-backed implementation of the CheckpointStore
//! trait. The state is written to a sibling temporary file, synced, and then
//! renamed over the checkpoint so readers only ever see a complete document.

use crate::checkpoint::traits::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::state::JobState;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON file checkpoint backend
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store that reads and writes the given checkpoint file
    ///
    /// Nothing is touched on disk until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, message: impl Into<String>) -> CheckpointError {
        CheckpointError::Corrupt {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl CheckpointStore for JsonFileStore {
    fn load(&self) -> CheckpointResult<Option<JobState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Io(e)),
        };

        let state: JobState =
            serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;

        state.validate().map_err(|message| self.corrupt(message))?;

        tracing::debug!(
            "Loaded checkpoint from {} (page {}, {} processed)",
            self.path.display(),
            state.page_cursor,
            state.total_processed
        );

        Ok(Some(state))
    }

    fn persist(&mut self, state: &JobState) -> CheckpointResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();

        {
            let mut file = File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ExecutionMode, JobConfig};
    use tempfile::TempDir;

    fn create_test_config() -> JobConfig {
        JobConfig {
            page_limit: 2,
            delay_ms: 0,
            mode: ExecutionMode::Headless,
        }
    }

    fn create_store(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("state").join("current_state.json"))
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_initialize_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);

        let state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.page_cursor, 1);
        assert!(!loaded.completed);
    }

    #[test]
    fn test_roundtrip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);

        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();
        store.record_processed(&mut state, "100").unwrap();
        store.record_processed(&mut state, "101").unwrap();
        store.advance_page(&mut state, 2).unwrap();
        store.record_processed(&mut state, "200").unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.total_processed, 3);
        assert_eq!(loaded.last_processed_key.as_deref(), Some("200"));
        assert_eq!(loaded.job_config, create_test_config());
    }

    #[test]
    fn test_record_processed_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        assert!(store.record_processed(&mut state, "A").unwrap());
        assert!(!store.record_processed(&mut state, "A").unwrap());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.total_processed, 1);
        assert_eq!(loaded.processed_keys.len(), 1);
    }

    #[test]
    fn test_page_cursor_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        let mut observed = vec![state.page_cursor];
        for cursor in [1, 2, 2, 5] {
            store.advance_page(&mut state, cursor).unwrap();
            observed.push(store.load().unwrap().unwrap().page_cursor);
        }
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));

        let result = store.advance_page(&mut state, 4);
        assert!(matches!(result, Err(CheckpointError::InvalidTransition(_))));
        assert_eq!(store.load().unwrap().unwrap().page_cursor, 5);
        assert_eq!(state.page_cursor, 5);
    }

    #[test]
    fn test_double_completion_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        store.mark_completed(&mut state).unwrap();
        let result = store.mark_completed(&mut state);
        assert!(matches!(result, Err(CheckpointError::InvalidTransition(_))));
        assert!(store.load().unwrap().unwrap().completed);
    }

    #[test]
    fn test_updated_at_is_stamped_by_save() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        let before = state.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save(&mut state).unwrap();

        assert!(state.updated_at > before);
        assert_eq!(store.load().unwrap().unwrap().updated_at, state.updated_at);
    }

    #[test]
    fn test_unparsable_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = create_store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        let result = store.load();
        assert!(matches!(result, Err(CheckpointError::Corrupt { .. })));
    }

    #[test]
    fn test_inconsistent_counter_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        let mut state = store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();
        store.record_processed(&mut state, "A").unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let tampered = content.replace("\"total_processed\": 1", "\"total_processed\": 7");
        fs::write(store.path(), tampered).unwrap();

        assert!(matches!(
            store.load(),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        assert!(!store.temp_path().exists());
        assert!(store.path().exists());
    }

    #[test]
    fn test_timestamps_are_rfc3339_text() {
        let dir = TempDir::new().unwrap();
        let mut store = create_store(&dir);
        store
            .initialize("https://example.com/list", create_test_config())
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let started = raw["started_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(started).is_ok());
    }
}
