//! Record sink traits and types
//!
//! This module defines the record handed to sinks and the trait every sink
//! implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Named values extracted from a page
pub type Fields = BTreeMap<String, String>;

/// Errors that can occur while handing records to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write record: {0}")]
    Write(String),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sink is closed")]
    Closed,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// One assembled item: listing row values plus detail page values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Which source produced this record
    pub data_source: String,

    /// Item key, unique within the target
    pub key: String,

    /// Listing page the item was found on
    pub page: u32,

    pub detail_address: String,

    /// Values taken from the listing row
    pub listing: Fields,

    /// Values taken from the detail page
    pub detail: Fields,

    pub collected_at: DateTime<Utc>,
}

/// Trait for record sinks
///
/// The controller emits a record and only then checkpoints its key, so a
/// crash between the two steps re-emits the record on resume. Sinks must
/// either tolerate such duplicates or be keyed by `Record::key`.
#[async_trait]
pub trait RecordSink: Send {
    /// Accepts one record
    ///
    /// A durable sink only returns `Ok` once the record survives a crash.
    async fn accept(&mut self, record: &Record) -> SinkResult<()>;

    /// Flushes buffered output
    async fn flush(&mut self) -> SinkResult<()> {
        Ok(())
    }

    /// Returns true if an accepted record is guaranteed to be on disk
    fn is_durable(&self) -> bool;
}
