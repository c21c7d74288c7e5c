//! Retrying page fetcher
//!
//! This module wraps a `PageSource` with:
//! - Bounded retries (`MAX_RETRIES` attempts per address)
//! - Linear backoff with a best-effort session refresh between attempts
//! - Drift detection when the loaded address differs from the requested one
//! - A politeness delay after every successful load
//!
//! Every sleep is cut short by a stop request.

use crate::crawler::control::CrawlControl;
use crate::crawler::events::{CrawlEvent, Notifier};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of load attempts per address
pub const MAX_RETRIES: u32 = 3;

/// A loaded page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Address the page was actually served from (after redirects)
    pub address: String,
    /// True when the page finished loading and is usable
    pub ready: bool,
    /// HTTP status, when the source has one
    pub status: Option<u16>,
    /// Raw page markup
    pub body: String,
}

/// Errors raised by a page source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session is closed")]
    Closed,
}

/// Loads pages by address (an HTTP client, a browser session, a fixture...)
#[async_trait]
pub trait PageSource: Send {
    /// Navigates to `address` and returns whatever was served
    async fn navigate(&mut self, address: &str) -> Result<Page, SourceError>;

    /// Resets the session after a failed attempt
    async fn refresh(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Releases the session
    async fn close(&mut self) {}
}

/// What to do with a page that loaded at an unexpected address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyDecision {
    /// Navigate again, once, without consuming an attempt
    Retry,
    /// Use the page as served
    Accept,
    /// Count the attempt as failed
    Abort,
}

/// Decides how to handle address drift
///
/// Interactive front ends prompt the operator; headless runs use an
/// `AnomalyPolicy`.
#[async_trait]
pub trait AnomalyHandler: Send + Sync {
    async fn handle(&self, requested: &str, resolved: &str) -> AnomalyDecision;
}

/// Fixed anomaly decision for unattended runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnomalyPolicy {
    #[default]
    Retry,
    Accept,
    Abort,
}

#[async_trait]
impl AnomalyHandler for AnomalyPolicy {
    async fn handle(&self, _requested: &str, _resolved: &str) -> AnomalyDecision {
        match self {
            Self::Retry => AnomalyDecision::Retry,
            Self::Accept => AnomalyDecision::Accept,
            Self::Abort => AnomalyDecision::Abort,
        }
    }
}

/// Result of a fetch with retries
#[derive(Debug)]
pub enum FetchOutcome {
    /// The page loaded and is ready
    Loaded(Page),
    /// Every attempt failed
    Failed { attempts: u32, reason: String },
    /// A stop was requested before the page could be loaded
    Cancelled,
}

enum Attempt {
    Loaded(Page),
    Failed(String),
    Cancelled,
}

/// Loads pages through a `PageSource`, retrying transient failures
pub struct RetryingFetcher {
    source: Box<dyn PageSource>,
    anomaly: Box<dyn AnomalyHandler>,
    control: CrawlControl,
    notifier: Notifier,
    delay: Duration,
    max_retries: u32,
}

impl RetryingFetcher {
    /// Creates a fetcher that waits `delay` after each load
    pub fn new(source: Box<dyn PageSource>, control: CrawlControl, delay: Duration) -> Self {
        Self {
            source,
            anomaly: Box::new(AnomalyPolicy::default()),
            control,
            notifier: Notifier::default(),
            delay,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_anomaly_handler(mut self, handler: Box<dyn AnomalyHandler>) -> Self {
        self.anomaly = handler;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub(crate) fn set_anomaly_handler(&mut self, handler: Box<dyn AnomalyHandler>) {
        self.anomaly = handler;
    }

    pub(crate) fn set_control(&mut self, control: CrawlControl) {
        self.control = control;
    }

    pub(crate) fn set_notifier(&mut self, notifier: Notifier) {
        self.notifier = notifier;
    }

    /// Loads `address`, making at most `max_retries` attempts
    ///
    /// Attempt `n` that fails is followed by a session refresh and a sleep of
    /// `delay * n`. A stop request observed at any point ends the fetch with
    /// `FetchOutcome::Cancelled`.
    pub async fn fetch(&mut self, address: &str) -> FetchOutcome {
        let mut attempts = 0;
        let mut drift_retried = false;
        let mut reason = String::from("no attempt made");

        while attempts < self.max_retries {
            if self.control.is_stopped() {
                return FetchOutcome::Cancelled;
            }
            attempts += 1;

            match self.attempt(address, &mut drift_retried).await {
                Attempt::Loaded(page) => {
                    if self.control.sleep(self.delay).await {
                        tracing::debug!("Stop requested during politeness delay");
                    }
                    return FetchOutcome::Loaded(page);
                }
                Attempt::Cancelled => return FetchOutcome::Cancelled,
                Attempt::Failed(why) => reason = why,
            }

            if attempts < self.max_retries {
                self.notifier.emit(CrawlEvent::FetchRetry {
                    address: address.to_string(),
                    attempt: attempts,
                    reason: reason.clone(),
                });

                if let Err(e) = self.source.refresh().await {
                    tracing::debug!("Session refresh failed: {}", e);
                }
                if self.control.sleep(self.delay * attempts).await {
                    return FetchOutcome::Cancelled;
                }
            }
        }

        FetchOutcome::Failed { attempts, reason }
    }

    async fn attempt(&mut self, address: &str, drift_retried: &mut bool) -> Attempt {
        let page = match self.load(address).await {
            Ok(page) => page,
            Err(reason) => return Attempt::Failed(reason),
        };

        if same_address(address, &page.address) {
            return Attempt::Loaded(page);
        }

        self.notifier.emit(CrawlEvent::Anomaly {
            requested: address.to_string(),
            resolved: page.address.clone(),
        });

        // The single re-navigation is already spent
        if *drift_retried {
            return Attempt::Failed(format!(
                "redirected to {} again after re-navigation",
                page.address
            ));
        }

        match self.anomaly.handle(address, &page.address).await {
            AnomalyDecision::Accept => Attempt::Loaded(page),
            AnomalyDecision::Abort => {
                Attempt::Failed(format!("redirected to {}; aborted", page.address))
            }
            AnomalyDecision::Retry => {
                *drift_retried = true;
                if self.control.sleep(self.delay).await {
                    return Attempt::Cancelled;
                }

                match self.load(address).await {
                    Ok(page) if same_address(address, &page.address) => Attempt::Loaded(page),
                    Ok(page) => Attempt::Failed(format!(
                        "still redirected to {} after re-navigation",
                        page.address
                    )),
                    Err(reason) => Attempt::Failed(reason),
                }
            }
        }
    }

    async fn load(&mut self, address: &str) -> Result<Page, String> {
        let page = self
            .source
            .navigate(address)
            .await
            .map_err(|e| e.to_string())?;

        if !page.ready {
            return Err(match page.status {
                Some(status) => format!("page not ready (HTTP {})", status),
                None => "page not ready".to_string(),
            });
        }
        Ok(page)
    }

    /// Releases the underlying session
    pub async fn close(&mut self) {
        self.source.close().await;
    }
}

/// Compares two addresses ignoring fragments and a trailing slash
pub fn same_address(requested: &str, resolved: &str) -> bool {
    match (Url::parse(requested), Url::parse(resolved)) {
        (Ok(mut a), Ok(mut b)) => {
            a.set_fragment(None);
            b.set_fragment(None);
            a.as_str().trim_end_matches('/') == b.as_str().trim_end_matches('/')
        }
        _ => requested.trim_end_matches('/') == resolved.trim_end_matches('/'),
    }
}
