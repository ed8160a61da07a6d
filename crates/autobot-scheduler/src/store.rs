use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::{format_ts, init_db, parse_ts},
    error::{Result, SchedulerError},
    types::{Job, JobHandle, JobStatus, NewJob},
};

const JOB_COLUMNS: &str = "id, kind, payload, status, not_before, attempts, last_error,
                           created_at, started_at, finished_at";

/// How long SQLite waits on a lock held by another process before failing.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// SQLite-backed job storage shared by producers and the engine.
///
/// Cloning is cheap; clones share one connection. Producers and the worker
/// normally open separate stores on the same file so neither waits on the
/// other's mutex.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Open (or create) the queue database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Private in-memory queue, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::QueueUnavailable("job store lock poisoned".to_string()))
    }

    /// Durably insert a pending job. Any failure is reported as
    /// [`SchedulerError::QueueUnavailable`].
    pub fn insert(&self, job: NewJob, not_before: DateTime<Utc>) -> Result<JobHandle> {
        let conn = self.lock()?;
        let id = Uuid::now_v7().to_string();
        let now = format_ts(Utc::now());

        conn.execute(
            "INSERT INTO jobs (id, kind, payload, status, not_before, attempts, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, 0, ?5)",
            params![id, job.kind, job.payload, format_ts(not_before), now],
        )
        .map_err(|e| SchedulerError::QueueUnavailable(e.to_string()))?;

        info!(job_id = %id, kind = %job.kind, %not_before, "job enqueued");
        Ok(JobHandle { id, not_before })
    }

    /// Fetch one job by ID.
    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Cancel a job that has not been claimed yet.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = format_ts(Utc::now());
        let n = conn.execute(
            "UPDATE jobs SET status = 'cancelled', finished_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now, id],
        )?;
        if n == 1 {
            info!(job_id = %id, "job cancelled");
            return Ok(());
        }

        let status: Option<String> = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        match status {
            None => Err(SchedulerError::JobNotFound { id: id.to_string() }),
            Some(raw) => Err(SchedulerError::NotCancellable {
                id: id.to_string(),
                status: parse_status(0, &raw)?,
            }),
        }
    }

    /// Atomically move up to `limit` due jobs from `pending` to `running`.
    ///
    /// Runs inside `BEGIN IMMEDIATE`, so two workers polling the same file
    /// can never claim the same row.
    pub fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.lock()?;
        let now_str = format_ts(now);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Collect inside the block so `stmt` is dropped before the UPDATEs.
        let due: Vec<Job> = {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE status = 'pending' AND not_before <= ?1
                 ORDER BY not_before, id
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now_str, limit as i64], row_to_job)?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut claimed = Vec::with_capacity(due.len());
        for mut job in due {
            let n = tx.execute(
                "UPDATE jobs SET status = 'running', started_at = ?1, attempts = attempts + 1
                 WHERE id = ?2 AND status = 'pending'",
                params![now_str, job.id],
            )?;
            if n == 1 {
                job.status = JobStatus::Running;
                job.started_at = Some(now);
                job.attempts += 1;
                claimed.push(job);
            }
        }
        tx.commit()?;

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "claimed due jobs");
        }
        Ok(claimed)
    }

    /// Record the handler outcome for a running job.
    pub fn finish(
        &self,
        id: &str,
        outcome: &std::result::Result<(), String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let (status, error) = match outcome {
            Ok(()) => (JobStatus::Completed, None),
            Err(e) => (JobStatus::Failed, Some(e.as_str())),
        };
        let n = conn.execute(
            "UPDATE jobs SET status = ?1, last_error = ?2, finished_at = ?3
             WHERE id = ?4 AND status = 'running'",
            params![status.as_str(), error, format_ts(now), id],
        )?;
        if n == 0 {
            warn!(job_id = %id, %status, "job was no longer running when its outcome arrived");
        }
        Ok(())
    }

    /// Mark jobs that have been `running` since before `cutoff` as interrupted.
    ///
    /// Such rows belong to a worker that died mid-delivery. They are not
    /// re-run: the comment may or may not have been posted.
    pub fn mark_stale_running(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE jobs SET status = 'interrupted', finished_at = ?1,
                    last_error = 'worker stopped before the job finished'
             WHERE status = 'running' AND started_at < ?2",
            params![format_ts(now), format_ts(cutoff)],
        )?;
        if n > 0 {
            warn!(count = n, "stale running jobs marked interrupted");
        }
        Ok(n)
    }

    /// Number of jobs per status.
    pub fn status_counts(&self) -> Result<Vec<(JobStatus, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((parse_status(0, &raw)?, count as u64))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

fn parse_status(idx: usize, raw: &str) -> rusqlite::Result<JobStatus> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Map a SQLite row (selected with `JOB_COLUMNS`) to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(3)?;
    let not_before: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    let started_at: Option<String> = row.get(8)?;
    let finished_at: Option<String> = row.get(9)?;

    Ok(Job {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: row.get(2)?,
        status: parse_status(3, &status)?,
        not_before: parse_ts(4, &not_before)?,
        attempts: row.get::<_, i64>(5)? as u32,
        last_error: row.get(6)?,
        created_at: parse_ts(7, &created_at)?,
        started_at: started_at.as_deref().map(|s| parse_ts(8, s)).transpose()?,
        finished_at: finished_at.as_deref().map(|s| parse_ts(9, s)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_job(tag: &str) -> NewJob {
        NewJob::new("test", &serde_json::json!({ "tag": tag })).unwrap()
    }

    #[test]
    fn insert_then_get() {
        let store = JobStore::open_in_memory().unwrap();
        let at = Utc::now() + Duration::days(90);
        let handle = store.insert(new_job("a"), at).unwrap();

        let job = store.get(&handle.id).unwrap().expect("job exists");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.kind, "test");
        assert_eq!(job.attempts, 0);
        assert_eq!(format_ts(job.not_before), format_ts(at));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn only_due_jobs_are_claimed() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        let past = store.insert(new_job("past"), now - Duration::hours(1)).unwrap();
        let future = store.insert(new_job("future"), now + Duration::hours(1)).unwrap();

        let claimed = store.claim_due(now, 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, past.id);
        assert_eq!(claimed[0].status, JobStatus::Running);
        assert_eq!(claimed[0].attempts, 1);

        let later = store.claim_due(now + Duration::hours(2), 10).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].id, future.id);
    }

    #[test]
    fn a_claimed_job_is_not_claimed_twice() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        store.insert(new_job("once"), now).unwrap();

        assert_eq!(store.claim_due(now, 10).unwrap().len(), 1);
        assert!(store.claim_due(now, 10).unwrap().is_empty());
    }

    #[test]
    fn claim_respects_limit_and_order() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        let second = store.insert(new_job("second"), now - Duration::minutes(1)).unwrap();
        let first = store.insert(new_job("first"), now - Duration::minutes(5)).unwrap();

        let claimed = store.claim_due(now, 1).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first.id);
        assert_eq!(store.claim_due(now, 1).unwrap()[0].id, second.id);
        assert!(store.claim_due(now, 0).unwrap().is_empty());
    }

    #[test]
    fn finish_records_outcome() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        let ok = store.insert(new_job("ok"), now).unwrap();
        let bad = store.insert(new_job("bad"), now).unwrap();
        store.claim_due(now, 10).unwrap();

        store.finish(&ok.id, &Ok(()), now).unwrap();
        store.finish(&bad.id, &Err("HTTP 401".to_string()), now).unwrap();

        let ok = store.get(&ok.id).unwrap().unwrap();
        assert_eq!(ok.status, JobStatus::Completed);
        assert!(ok.finished_at.is_some());
        let bad = store.get(&bad.id).unwrap().unwrap();
        assert_eq!(bad.status, JobStatus::Failed);
        assert_eq!(bad.last_error.as_deref(), Some("HTTP 401"));
    }

    #[test]
    fn cancel_only_applies_to_pending_jobs() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        let later = store.insert(new_job("later"), now + Duration::days(1)).unwrap();
        let due = store.insert(new_job("due"), now).unwrap();

        store.cancel(&later.id).unwrap();
        assert_eq!(store.get(&later.id).unwrap().unwrap().status, JobStatus::Cancelled);
        assert!(store.claim_due(now + Duration::days(2), 10).unwrap().iter().all(|j| j.id != later.id));

        let err = store.cancel(&due.id).unwrap_err();
        assert!(matches!(err, SchedulerError::NotCancellable { status: JobStatus::Running, .. }));

        let err = store.cancel("nope").unwrap_err();
        assert!(matches!(err, SchedulerError::JobNotFound { .. }));
    }

    #[test]
    fn cancel_reports_corrupt_status_instead_of_guessing() {
        let store = JobStore::open_in_memory().unwrap();
        let handle = store.insert(new_job("mangled"), Utc::now()).unwrap();
        store
            .lock()
            .unwrap()
            .execute("UPDATE jobs SET status = 'exploded' WHERE id = ?1", [&handle.id])
            .unwrap();

        let err = store.cancel(&handle.id).unwrap_err();
        assert!(matches!(err, SchedulerError::Database(_)), "{err}");
    }

    #[test]
    fn stale_running_jobs_become_interrupted() {
        let store = JobStore::open_in_memory().unwrap();
        let start = Utc::now();
        let handle = store.insert(new_job("stuck"), start).unwrap();
        store.claim_due(start, 10).unwrap();

        assert_eq!(store.mark_stale_running(start - Duration::seconds(1), start).unwrap(), 0);
        let later = start + Duration::minutes(10);
        assert_eq!(store.mark_stale_running(later - Duration::minutes(5), later).unwrap(), 1);

        let job = store.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Interrupted);
        assert!(store.claim_due(later, 10).unwrap().is_empty());
    }

    #[test]
    fn broken_store_reports_queue_unavailable() {
        let store = JobStore::open_in_memory().unwrap();
        store.lock().unwrap().execute_batch("DROP TABLE jobs;").unwrap();

        let err = store.insert(new_job("lost"), Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::QueueUnavailable(_)));
    }

    #[test]
    fn separate_connections_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let producer = JobStore::open(&path).unwrap();
        let worker = JobStore::open(&path).unwrap();

        let handle = producer.insert(new_job("shared"), Utc::now()).unwrap();
        let claimed = worker.claim_due(Utc::now(), 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, handle.id);
        assert_eq!(producer.get(&handle.id).unwrap().unwrap().status, JobStatus::Running);
    }

    #[test]
    fn status_counts_group_by_status() {
        let store = JobStore::open_in_memory().unwrap();
        let now = Utc::now();
        store.insert(new_job("a"), now).unwrap();
        store.insert(new_job("b"), now + Duration::days(1)).unwrap();
        store.claim_due(now, 10).unwrap();

        let counts = store.status_counts().unwrap();
        assert!(counts.contains(&(JobStatus::Pending, 1)));
        assert!(counts.contains(&(JobStatus::Running, 1)));
    }
}
