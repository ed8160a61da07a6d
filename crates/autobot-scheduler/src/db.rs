use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Connection};

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and an index on `(status, not_before)`
/// so the polling query stays cheap even with many long-horizon jobs.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id           TEXT    NOT NULL PRIMARY KEY,
            kind         TEXT    NOT NULL,
            payload      TEXT    NOT NULL,   -- opaque JSON, decoded by the handler
            status       TEXT    NOT NULL DEFAULT 'pending',
            not_before   TEXT    NOT NULL,   -- fixed-width RFC 3339, UTC
            attempts     INTEGER NOT NULL DEFAULT 0,
            last_error   TEXT,
            created_at   TEXT    NOT NULL,
            started_at   TEXT,
            finished_at  TEXT
        ) STRICT;

        -- Polling: SELECT … WHERE status = 'pending' AND not_before <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs (status, not_before);
        ",
    )?;
    Ok(())
}

/// Fixed-width timestamp encoding (`2024-07-15T16:00:00.000Z`).
///
/// Every stored timestamp uses this exact shape so that SQL string
/// comparison orders rows chronologically.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a timestamp column written by [`format_ts`].
pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
