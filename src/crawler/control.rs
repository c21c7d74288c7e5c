//! Pause, resume and stop signalling
//!
//! Any caller holding a `CrawlControl` can raise these signals at any time.
//! The controller only observes them at its cooperative checkpoints: before
//! each page, before each item, and while sleeping between retries.

use crate::state::ControllerState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Requested run mode, written by callers and read by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Run,
    Pause,
    Stop,
}

/// Cloneable handle for steering a running job
#[derive(Debug, Clone)]
pub struct CrawlControl {
    signal: Arc<watch::Sender<RunSignal>>,
    status: Arc<watch::Sender<ControllerState>>,
}

impl CrawlControl {
    /// Creates a handle in the `Run` signal and `Idle` status
    pub fn new() -> Self {
        let (signal, _) = watch::channel(RunSignal::Run);
        let (status, _) = watch::channel(ControllerState::Idle);
        Self {
            signal: Arc::new(signal),
            status: Arc::new(status),
        }
    }

    /// Requests a pause; returns false if the job is already paused or stopping
    pub fn pause(&self) -> bool {
        self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Run {
                *signal = RunSignal::Pause;
                true
            } else {
                false
            }
        })
    }

    /// Lifts a pause; a stop request is never undone
    pub fn resume(&self) -> bool {
        self.signal.send_if_modified(|signal| {
            if *signal == RunSignal::Pause {
                *signal = RunSignal::Run;
                true
            } else {
                false
            }
        })
    }

    /// Requests a stop, waking any paused or sleeping worker
    pub fn stop(&self) {
        self.signal.send_replace(RunSignal::Stop);
    }

    /// Returns the current signal
    pub fn signal(&self) -> RunSignal {
        *self.signal.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.signal() == RunSignal::Pause
    }

    pub fn is_stopped(&self) -> bool {
        self.signal() == RunSignal::Stop
    }

    /// Blocks while paused
    ///
    /// Returns true when work may continue, false when a stop was requested.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.signal.subscribe();
        let signal = rx
            .wait_for(|signal| *signal != RunSignal::Pause)
            .await
            .map(|signal| *signal);
        matches!(signal, Ok(RunSignal::Run))
    }

    /// Sleeps for `duration` unless a stop arrives first
    ///
    /// Returns true if a stop was requested before or during the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        let mut rx = self.signal.subscribe();
        let stopped = tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = rx.wait_for(|signal| *signal == RunSignal::Stop) => true,
        };
        stopped
    }

    /// Resolves once a stop has been requested
    pub async fn stopped(&self) {
        let mut rx = self.signal.subscribe();
        let _ = rx.wait_for(|signal| *signal == RunSignal::Stop).await;
    }

    /// Returns the controller state as last published by the worker
    ///
    /// Front ends read this for display; the worker's own view is authoritative.
    pub fn status(&self) -> ControllerState {
        *self.status.borrow()
    }

    /// Subscribes to controller state changes
    pub fn subscribe_status(&self) -> watch::Receiver<ControllerState> {
        self.status.subscribe()
    }

    pub(crate) fn publish_status(&self, state: ControllerState) {
        self.status.send_replace(state);
    }
}

impl Default for CrawlControl {
    fn default() -> Self {
        Self::new()
    }
}
