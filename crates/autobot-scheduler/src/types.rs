use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Lifecycle state of a deferred job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its `not_before` instant.
    Pending,
    /// Claimed by a worker; the handler is in flight.
    Running,
    /// Handler finished successfully.
    Completed,
    /// Handler returned an error. No retry is attempted.
    Failed,
    /// Cancelled before it was claimed.
    Cancelled,
    /// Left `running` by a worker that stopped mid-delivery.
    Interrupted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "interrupted" => Ok(JobStatus::Interrupted),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A job as submitted by a producer, before it has an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// Routing key for the handler (e.g. `"commit_comment"`).
    pub kind: String,
    /// JSON-encoded payload.
    pub payload: String,
}

impl NewJob {
    /// Encode `payload` as JSON under `kind`.
    pub fn new<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        let payload =
            serde_json::to_string(payload).map_err(|e| SchedulerError::InvalidPayload(e.to_string()))?;
        Ok(Self {
            kind: kind.into(),
            payload,
        })
    }
}

/// Returned by `enqueue`; enough to look the job up or cancel it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// UUIDv7 string; primary key, time-sortable.
    pub id: String,
    pub not_before: DateTime<Utc>,
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: String,
    /// Opaque JSON forwarded to the job handler.
    pub payload: String,
    pub status: JobStatus,
    /// The job must not start before this instant.
    pub not_before: DateTime<Utc>,
    /// Number of times a worker has claimed the job (0 or 1 without retries).
    pub attempts: u32,
    /// Error text from the last failed or interrupted run.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the JSON payload into the handler's own type.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.payload)
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            not_before: self.not_before,
        }
    }
}
