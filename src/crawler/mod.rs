//! Crawler module for walking paginated listings
//!
//! This module contains the core crawling logic, including:
//! - Page loading with bounded retries and drift handling
//! - Listing and detail extraction
//! - Pause, resume and stop signalling
//! - The controller that ties pages, items, sink and checkpoint together

mod control;
mod controller;
mod events;
mod extract;
mod fetcher;
mod http;
mod selector;

pub use control::{CrawlControl, RunSignal};
pub use controller::{Controller, RunReport};
pub use events::{ChannelListener, CrawlEvent, ProgressListener};
pub use extract::{skip_through, ExtractionError, Extractor, ListingItem};
pub use fetcher::{
    same_address, AnomalyDecision, AnomalyHandler, AnomalyPolicy, FetchOutcome, Page, PageSource,
    RetryingFetcher, SourceError, MAX_RETRIES,
};
pub use http::{build_http_client, HttpPageSource};
pub use selector::SelectorExtractor;

use crate::checkpoint::{CheckpointStore, JsonFileStore};
use crate::config::Config;
use crate::output::open_sink;
use crate::state::{ExecutionMode, JobConfig, JobState};
use crate::{ConfigError, HarvestError, Result};

/// Loads the job for `target` from `store`, or starts a new one
///
/// A stored job for a different target is rejected unless `fresh` is set,
/// in which case the store is overwritten with a new job. On resume the
/// stored job parameters win over `job_config`.
///
/// # Returns
///
/// * `Ok(JobState)` - The job to run
/// * `Err(HarvestError::Checkpoint)` - The stored checkpoint is corrupt
/// * `Err(HarvestError::TargetMismatch)` - The store belongs to another target
pub fn open_job(
    store: &mut dyn CheckpointStore,
    target: &str,
    job_config: JobConfig,
    fresh: bool,
) -> Result<JobState> {
    if fresh {
        tracing::info!("Starting a fresh job for {}", target);
        return Ok(store.initialize(target, job_config)?);
    }

    match store.load()? {
        Some(state) if state.target != target => Err(HarvestError::TargetMismatch {
            stored: state.target,
            requested: target.to_string(),
        }),
        Some(state) => {
            if state.job_config != job_config {
                tracing::info!(
                    "Resuming with stored job parameters (limit {}, delay {}ms, {})",
                    state.job_config.page_limit,
                    state.job_config.delay_ms,
                    state.job_config.mode
                );
            }
            tracing::info!(
                "Resuming {} from page {} ({} items processed)",
                target,
                state.page_cursor,
                state.total_processed
            );
            Ok(state)
        }
        None => Ok(store.initialize(target, job_config)?),
    }
}

/// Builds a controller wired to HTTP, CSS selectors and the configured sink
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `fresh` - Discard any existing checkpoint for this target
/// * `anomaly` - Picks how address drift is handled for the job's execution
///   mode, which on resume is the stored one
pub fn build_controller<F>(config: &Config, fresh: bool, anomaly: F) -> Result<Controller>
where
    F: FnOnce(ExecutionMode) -> Box<dyn AnomalyHandler>,
{
    let mut store = JsonFileStore::new(config.checkpoint_path());
    tracing::debug!("Using checkpoint {}", store.path().display());

    let state = open_job(&mut store, &config.job.target, config.job.job_config(), fresh)?;

    let extractor = SelectorExtractor::new(&config.selectors).map_err(|e| match e {
        ExtractionError::InvalidSelector { selector, message } => {
            HarvestError::Config(ConfigError::InvalidSelector { selector, message })
        }
        other => HarvestError::Config(ConfigError::Validation(other.to_string())),
    })?;
    let source = HttpPageSource::new(&config.http)?;
    let sink = open_sink(&config.output)?;
    let handler = anomaly(state.job_config.mode);

    Ok(Controller::new(
        Box::new(store),
        state,
        Box::new(source),
        Box::new(extractor),
        sink,
    )
    .with_anomaly_handler(handler))
}
