//! Checkpoint module for persisting job progress
//!
//! This module handles the durable side of a job:
//! - Loading a previous job's state (or detecting a corrupt one)
//! - Creating a fresh state for a new target
//! - Atomic saves after every processed item and page advance
//! - Deriving a stable checkpoint location for a target

mod file;
mod traits;

pub use file::JsonFileStore;
pub use traits::{CheckpointError, CheckpointResult, CheckpointStore};

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Computes the default checkpoint path for a target inside `state_dir`
///
/// The file name is the first 16 hex characters of the SHA-256 of the target
/// address, so every target gets its own checkpoint.
///
/// # Example
///
/// ```
/// use paged_harvest::checkpoint::default_checkpoint_path;
/// use std::path::Path;
///
/// let path = default_checkpoint_path(Path::new("data/state"), "https://example.com/list");
/// assert!(path.starts_with("data/state"));
/// assert_eq!(path.extension().unwrap(), "json");
/// ```
pub fn default_checkpoint_path(state_dir: &Path, target: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    let digest = hex::encode(hasher.finalize());
    state_dir.join(format!("{}.json", &digest[..16]))
}
