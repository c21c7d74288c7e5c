//! Configuration module for Paged-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use paged_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting up to {} pages", config.job.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FieldSelector, HttpConfig, JobSection, OutputConfig, PairSelector, SelectorConfig,
    SinkKind,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

use crate::checkpoint::default_checkpoint_path;
use std::path::{Path, PathBuf};

impl Config {
    /// Resolves where the checkpoint for this configuration lives
    pub fn checkpoint_path(&self) -> PathBuf {
        match &self.output.checkpoint_path {
            Some(path) => PathBuf::from(path),
            None => default_checkpoint_path(Path::new(&self.output.state_dir), &self.job.target),
        }
    }
}
