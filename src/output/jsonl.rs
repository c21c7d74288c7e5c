//! JSON lines record sink
//!
//! Appends one JSON object per line and syncs the file after every record,
//! so the data file grows continuously while the job runs.

use crate::output::traits::{Record, RecordSink, SinkResult};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Durable append-only JSON lines sink
pub struct JsonLinesSink {
    path: PathBuf,
    file: File,
}

impl JsonLinesSink {
    /// Opens (or creates) the records file for appending
    ///
    /// A partial last line left by an interrupted write is cut off first, so
    /// the next record starts on a line of its own.
    pub fn open(path: impl Into<PathBuf>) -> SinkResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if path.exists() {
            let mut existing = OpenOptions::new().read(true).write(true).open(&path)?;
            if let Some(keep) = complete_length(&mut existing)? {
                tracing::warn!(
                    "Discarding partial last line of {} ({} bytes kept)",
                    path.display(),
                    keep
                );
                existing.set_len(keep)?;
                existing.sync_data()?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Returns the records file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Returns the length up to the last newline when the file ends mid-line
fn complete_length(file: &mut File) -> std::io::Result<Option<u64>> {
    const CHUNK: u64 = 4096;

    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(None);
    }

    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(Some(start + pos as u64 + 1));
        }
        end = start;
    }
    Ok(Some(0))
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn accept(&mut self, record: &Record) -> SinkResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        Ok(())
    }

    async fn flush(&mut self) -> SinkResult<()> {
        self.file.flush()?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

/// Reads every record back from a JSON lines file
///
/// A trailing partial line (left by a crash mid-write) is ignored.
pub fn read_records(path: &Path) -> SinkResult<Vec<Record>> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let complete = content.ends_with('\n');

    let mut records = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Record>(line) {
            Ok(record) => records.push(record),
            Err(e) if i + 1 == lines.len() && !complete => {
                tracing::warn!("Ignoring truncated last record in {}: {}", path.display(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}
