//! Progress notifications
//!
//! Every progress message and every failure travels through the same
//! `CrawlEvent` channel. Events are always logged through `tracing`; front
//! ends attach a `ProgressListener` to receive them as well.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something a front end may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    JobStarted {
        target: String,
        page_cursor: u32,
        total_processed: u64,
    },
    AlreadyCompleted {
        target: String,
    },
    PageStarted {
        page: u32,
        address: String,
    },
    PageFinished {
        page: u32,
    },
    FastForward {
        key: String,
        skipped: usize,
    },
    ItemSkipped {
        key: String,
    },
    ItemProcessed {
        key: String,
        page: u32,
    },
    ItemFailed {
        key: String,
        error: String,
    },
    FetchRetry {
        address: String,
        attempt: u32,
        reason: String,
    },
    Anomaly {
        requested: String,
        resolved: String,
    },
    Paused,
    Resumed,
    Stopped {
        total_processed: u64,
    },
    Completed {
        total_processed: u64,
    },
    Failed {
        error: String,
    },
}

impl CrawlEvent {
    /// Returns true for events that report a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ItemFailed { .. } | Self::Failed { .. })
    }

    /// Returns true for events that report a recoverable problem
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::FetchRetry { .. } | Self::Anomaly { .. })
    }
}

impl fmt::Display for CrawlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobStarted {
                target,
                page_cursor,
                total_processed,
            } => write!(
                f,
                "Starting {} at page {} ({} items already processed)",
                target, page_cursor, total_processed
            ),
            Self::AlreadyCompleted { target } => {
                write!(f, "Job for {} is already completed", target)
            }
            Self::PageStarted { page, address } => {
                write!(f, "Starting to scrape page {}: {}", page, address)
            }
            Self::PageFinished { page } => write!(f, "Finished page {}", page),
            Self::FastForward { key, skipped } => write!(
                f,
                "Fast-forwarded past {} item(s) up to {}",
                skipped, key
            ),
            Self::ItemSkipped { key } => write!(f, "Skipping already processed: {}", key),
            Self::ItemProcessed { key, page } => {
                write!(f, "Processed item {} (page {})", key, page)
            }
            Self::ItemFailed { key, error } => write!(f, "Item {} failed: {}", key, error),
            Self::FetchRetry {
                address,
                attempt,
                reason,
            } => write!(
                f,
                "Attempt {} for {} failed: {}; retrying",
                attempt, address, reason
            ),
            Self::Anomaly {
                requested,
                resolved,
            } => write!(f, "Redirected from {} to {}", requested, resolved),
            Self::Paused => write!(f, "Scraping paused"),
            Self::Resumed => write!(f, "Scraping resumed"),
            Self::Stopped { total_processed } => {
                write!(f, "Scraping stopped ({} items processed)", total_processed)
            }
            Self::Completed { total_processed } => write!(
                f,
                "Scraping completed successfully ({} items processed)",
                total_processed
            ),
            Self::Failed { error } => write!(f, "Scraping failed: {}", error),
        }
    }
}

/// Receives progress events
pub trait ProgressListener: Send + Sync {
    fn on_event(&self, event: &CrawlEvent);
}

/// Forwards events to an unbounded channel (for interactive front ends)
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<CrawlEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CrawlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressListener for ChannelListener {
    fn on_event(&self, event: &CrawlEvent) {
        // A front end that went away must not stop the job
        let _ = self.tx.send(event.clone());
    }
}

/// Logs events and forwards them to the attached listener, if any
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    listener: Option<Arc<dyn ProgressListener>>,
}

impl Notifier {
    pub(crate) fn new(listener: Option<Arc<dyn ProgressListener>>) -> Self {
        Self { listener }
    }

    pub(crate) fn emit(&self, event: CrawlEvent) {
        if event.is_error() {
            tracing::error!("{}", event);
        } else if event.is_warning() {
            tracing::warn!("{}", event);
        } else {
            tracing::info!("{}", event);
        }

        if let Some(listener) = &self.listener {
            listener.on_event(&event);
        }
    }
}
