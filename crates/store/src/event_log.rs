//! Relational event log.
//!
//! Append-only `events` rows plus a denormalized `schemas` summary the
//! read-side queries without touching the filesystem. The filesystem store
//! remains the source of truth; these tables are a cache.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use hookforge_core::{EventRow, SchemaRecord};

use crate::errors::{StoreError, StoreResult};

pub struct EventLog {
    conn: Mutex<Connection>,
}

/// Aggregate counters for the read-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub total_events: u64,
    pub unique_kinds: u64,
    pub events_last_1h: u64,
    pub events_last_24h: u64,
    pub avg_processing_duration_ms: f64,
}

/// One persisted event, as returned to the read-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub row: EventRow,
}

/// One hour of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    /// Hour marker, `YYYY-MM-DDTHH` in UTC.
    pub hour: String,
    pub count: u64,
}

impl EventLog {
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory log (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload_fp TEXT NOT NULL,
                size_original INTEGER NOT NULL,
                size_redacted INTEGER NOT NULL,
                redacted_flag INTEGER NOT NULL,
                redacted_field_count INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                processing_duration_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, id DESC);
            CREATE INDEX IF NOT EXISTS idx_events_received ON events(received_at);

            CREATE TABLE IF NOT EXISTS schemas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL,
                structure_fp TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                total_received INTEGER NOT NULL,
                required_count INTEGER NOT NULL,
                optional_count INTEGER NOT NULL,
                redacted_count INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection poisoned".into()))
    }

    /// Append one row per successfully processed job.
    pub fn append_event(&self, row: &EventRow) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (kind, payload_fp, size_original, size_redacted,
                redacted_flag, redacted_field_count, received_at, processed_at,
                processing_duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.kind,
                row.payload_fingerprint,
                row.size_original,
                row.size_redacted,
                (row.redacted_field_count > 0) as i64,
                row.redacted_field_count,
                row.received_at.to_rfc3339(),
                row.processed_at.to_rfc3339(),
                row.processing_duration_ms,
            ],
        )?;
        Ok(())
    }

    /// Refresh the denormalized per-kind summary row.
    pub fn upsert_schema(&self, record: &SchemaRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO schemas (kind, version, structure_fp, first_seen,
                last_seen, last_modified, total_received, required_count,
                optional_count, redacted_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(kind) DO UPDATE SET
                version = excluded.version,
                structure_fp = excluded.structure_fp,
                last_seen = excluded.last_seen,
                last_modified = excluded.last_modified,
                total_received = excluded.total_received,
                required_count = excluded.required_count,
                optional_count = excluded.optional_count,
                redacted_count = excluded.redacted_count",
            params![
                record.kind,
                record.version,
                record.structure_fingerprint,
                record.first_seen.to_rfc3339(),
                record.last_seen.to_rfc3339(),
                record.last_modified.to_rfc3339(),
                record.total_received,
                record.fields.required.len() as i64,
                record.fields.optional.len() as i64,
                record.fields.redacted.len() as i64,
            ],
        )?;
        Ok(())
    }

    pub fn aggregates(&self) -> StoreResult<Aggregates> {
        let conn = self.lock()?;
        let now = Utc::now();
        let hour_ago = (now - Duration::hours(1)).to_rfc3339();
        let day_ago = (now - Duration::hours(24)).to_rfc3339();

        let total_events: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events",
            [],
            |row| row.get(0),
        )?;
        let unique_kinds: u64 = conn.query_row(
            "SELECT COUNT(*) FROM schemas",
            [],
            |row| row.get(0),
        )?;
        let events_last_1h: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE received_at >= ?1",
            params![hour_ago],
            |row| row.get(0),
        )?;
        let events_last_24h: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE received_at >= ?1",
            params![day_ago],
            |row| row.get(0),
        )?;
        let avg_processing_duration_ms: f64 = conn
            .query_row(
                "SELECT AVG(processing_duration_ms) FROM events",
                [],
                |row| row.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        Ok(Aggregates {
            total_events,
            unique_kinds,
            events_last_1h,
            events_last_24h,
            avg_processing_duration_ms,
        })
    }

    /// Most recent events, newest first, optionally filtered by kind.
    pub fn recent_events(
        &self,
        limit: usize,
        kind: Option<&str>,
    ) -> StoreResult<Vec<StoredEvent>> {
        let conn = self.lock()?;
        let limit = limit as i64;
        let (sql, binds): (&str, Vec<&dyn rusqlite::ToSql>) = match kind {
            Some(ref k) => (
                "SELECT id, kind, payload_fp, size_original, size_redacted,
                    redacted_field_count, received_at, processed_at,
                    processing_duration_ms
                 FROM events WHERE kind = ?1 ORDER BY id DESC LIMIT ?2",
                vec![k as &dyn rusqlite::ToSql, &limit],
            ),
            None => (
                "SELECT id, kind, payload_fp, size_original, size_redacted,
                    redacted_field_count, received_at, processed_at,
                    processing_duration_ms
                 FROM events ORDER BY id DESC LIMIT ?1",
                vec![&limit as &dyn rusqlite::ToSql],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(&binds[..], |row| {
            Ok(StoredEvent {
                id: row.get(0)?,
                row: EventRow {
                    kind: row.get(1)?,
                    payload_fingerprint: row.get(2)?,
                    size_original: row.get(3)?,
                    size_redacted: row.get(4)?,
                    redacted_field_count: row.get(5)?,
                    received_at: parse_ts(row.get::<_, String>(6)?),
                    processed_at: parse_ts(row.get::<_, String>(7)?),
                    processing_duration_ms: row.get(8)?,
                },
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Per-hour event counts for the trailing `hours` window, oldest first.
    /// Hours with no events are omitted.
    pub fn hourly_timeline(
        &self,
        hours: u32,
        kind: Option<&str>,
    ) -> StoreResult<Vec<TimelineBucket>> {
        let conn = self.lock()?;
        let cutoff =
            (Utc::now() - Duration::hours(hours as i64)).to_rfc3339();

        let (sql, binds): (&str, Vec<&dyn rusqlite::ToSql>) = match kind {
            Some(ref k) => (
                "SELECT substr(received_at, 1, 13) AS hour, COUNT(*)
                 FROM events WHERE received_at >= ?1 AND kind = ?2
                 GROUP BY hour ORDER BY hour",
                vec![&cutoff as &dyn rusqlite::ToSql, k],
            ),
            None => (
                "SELECT substr(received_at, 1, 13) AS hour, COUNT(*)
                 FROM events WHERE received_at >= ?1
                 GROUP BY hour ORDER BY hour",
                vec![&cutoff as &dyn rusqlite::ToSql],
            ),
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(&binds[..], |row| {
            Ok(TimelineBucket {
                hour: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            buckets.push(row?);
        }
        Ok(buckets)
    }

    /// One kind's summary row, if cached.
    pub fn schema_summary(
        &self,
        kind: &str,
    ) -> StoreResult<Option<(u64, u64)>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT version, total_received FROM schemas WHERE kind = ?1",
            params![kind],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(Into::into)
    }
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
