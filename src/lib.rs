//! Paged-Harvest: a resumable, page-by-page data collection engine
//!
//! This crate walks a paginated listing, visits every item's detail page and
//! hands the assembled records to a sink, while keeping a durable checkpoint
//! so an interrupted job resumes without re-processing or skipping items.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Paged-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Fetch failed for {address} after {attempts} attempt(s): {reason}")]
    FetchFailed {
        address: String,
        attempts: u32,
        reason: String,
    },

    #[error("Extraction failed for {address}: {source}")]
    ExtractionFailed {
        address: String,
        source: crawler::ExtractionError,
    },

    #[error("Record sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Invalid controller transition: {from} -> {to}")]
    InvalidTransition {
        from: state::ControllerState,
        to: state::ControllerState,
    },

    #[error("Checkpoint belongs to {stored}, not {requested}")]
    TargetMismatch { stored: String, requested: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if this error only concerns a single item
    ///
    /// Item-scoped failures are reported and the item is skipped; every other
    /// error terminates the run.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::ExtractionFailed { .. } | Self::Sink(_)
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Paged-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, JsonFileStore};
pub use config::Config;
pub use crawler::{Controller, CrawlControl, RunReport};
pub use state::{ControllerState, ExecutionMode, JobConfig, JobState};
