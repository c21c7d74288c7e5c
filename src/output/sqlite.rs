//! SQLite record sink
//!
//! Stores one row per item key. A record emitted twice (after a crash between
//! emission and checkpoint) overwrites its row and bumps `emit_count`, so the
//! table never holds duplicates.

use crate::output::traits::{Fields, Record, RecordSink, SinkError, SinkResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQL schema for the records database
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    key TEXT PRIMARY KEY,
    data_source TEXT NOT NULL,
    page INTEGER NOT NULL,
    detail_address TEXT NOT NULL,
    listing TEXT NOT NULL,
    detail TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    emit_count INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_records_page ON records(page);
"#;

/// SQLite-backed record sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the records database
    pub fn open(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Counts stored records
    pub fn count(&self) -> SinkResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Returns how many times a key has been emitted, if at all
    pub fn emit_count(&self, key: &str) -> SinkResult<Option<u32>> {
        let count = self
            .conn
            .query_row(
                "SELECT emit_count FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    /// Loads a stored record by key
    pub fn get(&self, key: &str) -> SinkResult<Option<Record>> {
        let row = self
            .conn
            .query_row(
                "SELECT key, data_source, page, detail_address, listing, detail, collected_at
                 FROM records WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, data_source, page, detail_address, listing, detail, collected_at)) = row
        else {
            return Ok(None);
        };

        let collected_at = collected_at
            .parse::<DateTime<Utc>>()
            .map_err(|e| SinkError::Write(format!("bad timestamp for {}: {}", key, e)))?;

        Ok(Some(Record {
            data_source,
            key,
            page,
            detail_address,
            listing: serde_json::from_str::<Fields>(&listing)?,
            detail: serde_json::from_str::<Fields>(&detail)?,
            collected_at,
        }))
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn accept(&mut self, record: &Record) -> SinkResult<()> {
        let listing = serde_json::to_string(&record.listing)?;
        let detail = serde_json::to_string(&record.detail)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (key, data_source, page, detail_address, listing, detail, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
                data_source = excluded.data_source,
                page = excluded.page,
                detail_address = excluded.detail_address,
                listing = excluded.listing,
                detail = excluded.detail,
                collected_at = excluded.collected_at,
                emit_count = records.emit_count + 1",
            params![
                record.key,
                record.data_source,
                record.page,
                record.detail_address,
                listing,
                detail,
                record.collected_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}
