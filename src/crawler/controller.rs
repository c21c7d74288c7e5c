//! Crawl controller
//!
//! Drives a job page by page:
//! - Reaches the checkpointed page (directly or by walking next-page links)
//! - Fast-forwards past the last processed item on the resume page
//! - Skips items whose keys are already recorded
//! - Emits each record to the sink, then records its key in the checkpoint
//! - Advances the page cursor after each page
//!
//! Pause and stop are observed before each page and before each item.

use crate::checkpoint::CheckpointStore;
use crate::crawler::control::CrawlControl;
use crate::crawler::events::{CrawlEvent, Notifier, ProgressListener};
use crate::crawler::extract::{skip_through, Extractor, ListingItem};
use crate::crawler::fetcher::{AnomalyHandler, FetchOutcome, Page, PageSource, RetryingFetcher};
use crate::output::{Record, RecordSink};
use crate::state::{ControllerState, JobState};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Summary of one `run` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Terminal state the run ended in
    pub outcome: ControllerState,
    /// Listing pages loaded during this run
    pub pages_visited: u32,
    /// Items emitted and recorded during this run
    pub processed: u64,
    /// Items skipped because their key was already recorded
    pub skipped: u64,
    /// Items that failed and were left unrecorded
    pub failed: u64,
    /// Items recorded by the job across all runs
    pub total_processed: u64,
}

impl RunReport {
    fn new() -> Self {
        Self {
            outcome: ControllerState::Idle,
            pages_visited: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            total_processed: 0,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} page(s), {} processed, {} skipped, {} failed ({} in total)",
            self.outcome,
            self.pages_visited,
            self.processed,
            self.skipped,
            self.failed,
            self.total_processed
        )
    }
}

/// How the crawl loop ended without an error
enum Finish {
    Exhausted,
    Stopped,
}

enum ItemFlow {
    Processed,
    Stopped,
}

enum PageLocation {
    At(String),
    Exhausted,
    Stopped,
}

/// Runs one job against its checkpoint
pub struct Controller {
    store: Box<dyn CheckpointStore>,
    state: JobState,
    fetcher: RetryingFetcher,
    extractor: Box<dyn Extractor>,
    sink: Box<dyn RecordSink>,
    control: CrawlControl,
    notifier: Notifier,
    phase: ControllerState,
}

impl Controller {
    /// Creates a controller for a job loaded from (or initialized in) `store`
    pub fn new(
        store: Box<dyn CheckpointStore>,
        state: JobState,
        source: Box<dyn PageSource>,
        extractor: Box<dyn Extractor>,
        sink: Box<dyn RecordSink>,
    ) -> Self {
        let control = CrawlControl::new();
        let fetcher = RetryingFetcher::new(source, control.clone(), state.job_config.delay());

        Self {
            store,
            state,
            fetcher,
            extractor,
            sink,
            control,
            notifier: Notifier::default(),
            phase: ControllerState::Idle,
        }
    }

    /// Sets how address drift is handled
    pub fn with_anomaly_handler(mut self, handler: Box<dyn AnomalyHandler>) -> Self {
        self.fetcher.set_anomaly_handler(handler);
        self
    }

    /// Steers this controller with an existing handle
    pub fn with_control(mut self, control: CrawlControl) -> Self {
        self.fetcher.set_control(control.clone());
        self.control = control;
        self
    }

    /// Attaches a listener for progress events
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.notifier = Notifier::new(Some(listener));
        self.fetcher.set_notifier(self.notifier.clone());
        self
    }

    /// Returns a handle for pausing, resuming and stopping this controller
    pub fn control(&self) -> CrawlControl {
        self.control.clone()
    }

    /// Returns the current state of this invocation
    pub fn phase(&self) -> ControllerState {
        self.phase
    }

    /// Returns the job state as last committed
    pub fn job(&self) -> &JobState {
        &self.state
    }

    /// Runs the job until it completes, is stopped, or fails
    ///
    /// A failed run saves the checkpoint, moves to `Failed` and returns the
    /// error that ended it.
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut report = RunReport::new();

        if self.state.completed {
            self.transition(ControllerState::Completed)?;
            self.notifier.emit(CrawlEvent::AlreadyCompleted {
                target: self.state.target.clone(),
            });
            return Ok(self.finish(report));
        }

        self.transition(ControllerState::Running)?;
        self.notifier.emit(CrawlEvent::JobStarted {
            target: self.state.target.clone(),
            page_cursor: self.state.page_cursor,
            total_processed: self.state.total_processed,
        });

        let result = self.crawl(&mut report).await;

        self.fetcher.close().await;
        if let Err(e) = self.sink.flush().await {
            tracing::warn!("Failed to flush record sink: {}", e);
        }

        match result {
            Ok(Finish::Exhausted) if !self.control.is_stopped() => {
                if let Err(e) = self.store.mark_completed(&mut self.state) {
                    return self.fail(e.into());
                }
                self.transition(ControllerState::Completed)?;
                self.notifier.emit(CrawlEvent::Completed {
                    total_processed: self.state.total_processed,
                });
                Ok(self.finish(report))
            }
            Ok(_) => {
                if let Err(e) = self.store.save(&mut self.state) {
                    return self.fail(e.into());
                }
                self.transition(ControllerState::Stopped)?;
                self.notifier.emit(CrawlEvent::Stopped {
                    total_processed: self.state.total_processed,
                });
                Ok(self.finish(report))
            }
            Err(e) => self.fail(e),
        }
    }

    async fn crawl(&mut self, report: &mut RunReport) -> Result<Finish> {
        let resume = self.state.resume_info();
        let page_limit = self.state.job_config.page_limit;
        let mut fast_forward = resume.last_processed_key;

        if resume.page_cursor > page_limit {
            return Ok(Finish::Exhausted);
        }

        let mut address = match self.locate_page(resume.page_cursor).await? {
            PageLocation::At(address) => address,
            PageLocation::Exhausted => return Ok(Finish::Exhausted),
            PageLocation::Stopped => return Ok(Finish::Stopped),
        };

        loop {
            let page_number = self.state.page_cursor;
            if page_number > page_limit {
                tracing::info!("Reached page limit of {}", page_limit);
                return Ok(Finish::Exhausted);
            }
            if !self.checkpoint_gate().await? {
                return Ok(Finish::Stopped);
            }

            self.notifier.emit(CrawlEvent::PageStarted {
                page: page_number,
                address: address.clone(),
            });

            let page = match self.load(&address).await? {
                Some(page) => page,
                None => return Ok(Finish::Stopped),
            };
            report.pages_visited += 1;

            let mut items = self
                .extractor
                .extract_items(&page)
                .map_err(|source| HarvestError::ExtractionFailed {
                    address: address.clone(),
                    source,
                })?;

            if let Some(marker) = fast_forward.take() {
                let before = items.len();
                items = skip_through(items, &marker);
                if items.len() < before {
                    self.notifier.emit(CrawlEvent::FastForward {
                        key: marker,
                        skipped: before - items.len(),
                    });
                }
            }

            for item in &items {
                if !self.checkpoint_gate().await? {
                    return Ok(Finish::Stopped);
                }

                if self.state.is_processed(&item.key) {
                    report.skipped += 1;
                    self.notifier.emit(CrawlEvent::ItemSkipped {
                        key: item.key.clone(),
                    });
                    continue;
                }

                match self.process_item(page_number, item).await {
                    Ok(ItemFlow::Processed) => report.processed += 1,
                    Ok(ItemFlow::Stopped) => return Ok(Finish::Stopped),
                    Err(e) if e.is_item_scoped() => {
                        report.failed += 1;
                        self.notifier.emit(CrawlEvent::ItemFailed {
                            key: item.key.clone(),
                            error: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }

            self.store.advance_page(&mut self.state, page_number + 1)?;
            self.notifier.emit(CrawlEvent::PageFinished { page: page_number });

            match self.extractor.next_page_address(&page) {
                Some(next) => address = next,
                None => {
                    tracing::info!("No more pages after page {}", page_number);
                    return Ok(Finish::Exhausted);
                }
            }
        }
    }

    /// Fetches, extracts and emits one item, then records its key
    async fn process_item(&mut self, page_number: u32, item: &ListingItem) -> Result<ItemFlow> {
        let detail_page = match self.load(&item.detail_address).await? {
            Some(page) => page,
            None => return Ok(ItemFlow::Stopped),
        };

        let detail = self
            .extractor
            .extract_detail(&detail_page)
            .map_err(|source| HarvestError::ExtractionFailed {
                address: item.detail_address.clone(),
                source,
            })?;

        if self.control.is_stopped() {
            tracing::debug!("Stop requested; discarding {} before emission", item.key);
            return Ok(ItemFlow::Stopped);
        }

        let record = Record {
            data_source: self.extractor.data_source().to_string(),
            key: item.key.clone(),
            page: page_number,
            detail_address: item.detail_address.clone(),
            listing: item.fields.clone(),
            detail,
            collected_at: Utc::now(),
        };

        self.sink.accept(&record).await?;
        self.store.record_processed(&mut self.state, &item.key)?;

        self.notifier.emit(CrawlEvent::ItemProcessed {
            key: item.key.clone(),
            page: page_number,
        });
        Ok(ItemFlow::Processed)
    }

    /// Finds the address of listing page `page_cursor`
    async fn locate_page(&mut self, page_cursor: u32) -> Result<PageLocation> {
        let target = self.state.target.clone();
        if page_cursor <= 1 {
            return Ok(PageLocation::At(target));
        }
        if let Some(address) = self.extractor.page_address(&target, page_cursor) {
            return Ok(PageLocation::At(address));
        }

        tracing::info!("Walking from {} to page {}", target, page_cursor);
        let mut address = target;
        for page_number in 1..page_cursor {
            if !self.checkpoint_gate().await? {
                return Ok(PageLocation::Stopped);
            }

            let page = match self.load(&address).await? {
                Some(page) => page,
                None => return Ok(PageLocation::Stopped),
            };

            match self.extractor.next_page_address(&page) {
                Some(next) => address = next,
                None => {
                    tracing::info!("Source ends at page {}", page_number);
                    return Ok(PageLocation::Exhausted);
                }
            }
        }

        Ok(PageLocation::At(address))
    }

    /// Loads a page; `None` means a stop was requested
    async fn load(&mut self, address: &str) -> Result<Option<Page>> {
        match self.fetcher.fetch(address).await {
            FetchOutcome::Loaded(page) => Ok(Some(page)),
            FetchOutcome::Cancelled => Ok(None),
            FetchOutcome::Failed { attempts, reason } => Err(HarvestError::FetchFailed {
                address: address.to_string(),
                attempts,
                reason,
            }),
        }
    }

    /// Honors pause and stop requests
    ///
    /// Returns false when the run must stop.
    async fn checkpoint_gate(&mut self) -> Result<bool> {
        if self.control.is_paused() {
            self.transition(ControllerState::Paused)?;
            self.notifier.emit(CrawlEvent::Paused);

            if !self.control.wait_while_paused().await {
                return Ok(false);
            }

            self.transition(ControllerState::Running)?;
            self.notifier.emit(CrawlEvent::Resumed);
        }

        Ok(!self.control.is_stopped())
    }

    fn transition(&mut self, next: ControllerState) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        tracing::debug!("Controller {} -> {}", self.phase, next);
        self.phase = next;
        self.control.publish_status(next);
        Ok(())
    }

    fn fail(&mut self, error: HarvestError) -> Result<RunReport> {
        if let Err(e) = self.store.save(&mut self.state) {
            tracing::error!("Failed to save checkpoint: {}", e);
        }
        if let Err(e) = self.transition(ControllerState::Failed) {
            tracing::error!("{}", e);
        }

        self.notifier.emit(CrawlEvent::Failed {
            error: error.to_string(),
        });
        Err(error)
    }

    fn finish(&self, mut report: RunReport) -> RunReport {
        report.outcome = self.phase;
        report.total_processed = self.state.total_processed;
        report
    }
}
