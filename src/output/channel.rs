//! Channel record sink for interactive front ends
//!
//! Forwards records to a tokio channel. Nothing is written to disk, so a
//! record accepted here is lost if the receiver drops it or the process dies.

use crate::output::traits::{Record, RecordSink, SinkError, SinkResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Non-durable sink that forwards records to a receiver
pub struct ChannelSink {
    tx: mpsc::Sender<Record>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that will see its records
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn accept(&mut self, record: &Record) -> SinkResult<()> {
        self.tx
            .send(record.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }

    fn is_durable(&self) -> bool {
        false
    }
}
