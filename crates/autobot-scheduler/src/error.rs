use thiserror::Error;

use crate::types::JobStatus;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The queue could not durably accept the job (store unreachable,
    /// locked, or the write failed).
    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Underlying SQLite / rusqlite error outside the enqueue path.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The job payload could not be encoded.
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// Only pending jobs can be cancelled.
    #[error("Job {id} is {status} and can no longer be cancelled")]
    NotCancellable { id: String, status: JobStatus },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
