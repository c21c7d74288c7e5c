//! Output module for handing assembled records to their destination
//!
//! This module handles:
//! - The `Record` shape shared by every sink
//! - Durable sinks (JSON lines file, SQLite database)
//! - A channel sink for interactive front ends
//! - Building the configured sink

mod channel;
mod jsonl;
mod sqlite;
mod traits;

pub use channel::ChannelSink;
pub use jsonl::{read_records, JsonLinesSink};
pub use sqlite::SqliteSink;
pub use traits::{Fields, Record, RecordSink, SinkError, SinkResult};

use crate::config::{OutputConfig, SinkKind};
use std::path::Path;

/// Opens the sink selected in the output configuration
///
/// # Arguments
///
/// * `config` - The output configuration
///
/// # Returns
///
/// * `Ok(Box<dyn RecordSink>)` - The opened sink
/// * `Err(SinkError)` - The records file or database could not be opened
pub fn open_sink(config: &OutputConfig) -> SinkResult<Box<dyn RecordSink>> {
    let path = Path::new(&config.records_path);
    let sink: Box<dyn RecordSink> = match config.sink {
        SinkKind::Jsonl => Box::new(JsonLinesSink::open(path)?),
        SinkKind::Sqlite => Box::new(SqliteSink::open(path)?),
    };

    tracing::info!(
        "Writing records to {} ({:?} sink)",
        config.records_path,
        config.sink
    );
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_configured_sinks() {
        let dir = tempfile::TempDir::new().unwrap();

        for (sink, file) in [(SinkKind::Jsonl, "r.jsonl"), (SinkKind::Sqlite, "r.db")] {
            let config = OutputConfig {
                state_dir: dir.path().display().to_string(),
                checkpoint_path: None,
                records_path: dir.path().join(file).display().to_string(),
                sink,
            };
            let opened = open_sink(&config).unwrap();
            assert!(opened.is_durable());
            assert!(dir.path().join(file).exists());
        }
    }
}
