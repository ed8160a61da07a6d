use autobot_core::{AccessToken, CommentJob};
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    store::JobStore,
    types::{Job, JobHandle, NewJob},
};

/// Producer-side view of the deferred-job queue.
///
/// `enqueue` returns once the job is durably accepted and never waits for
/// it to run. Deadlines in the past are accepted as-is and run on the next
/// worker poll.
pub trait JobQueue: Send + Sync {
    /// Accept `job` for execution no earlier than `not_before`.
    fn enqueue(&self, job: NewJob, not_before: DateTime<Utc>) -> Result<JobHandle>;

    /// Cancel a job that has not started yet.
    fn cancel(&self, handle: &JobHandle) -> Result<()>;

    /// Look up the current state of a job.
    fn get(&self, id: &str) -> Result<Option<Job>>;
}

impl JobQueue for JobStore {
    fn enqueue(&self, job: NewJob, not_before: DateTime<Utc>) -> Result<JobHandle> {
        self.insert(job, not_before)
    }

    fn cancel(&self, handle: &JobHandle) -> Result<()> {
        JobStore::cancel(self, &handle.id)
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        JobStore::get(self, id)
    }
}

/// Schedule a commit comment to be posted at or after `deadline`.
pub fn schedule_comment(
    queue: &dyn JobQueue,
    access_token: AccessToken,
    api_url: &str,
    body: &str,
    deadline: DateTime<Utc>,
) -> Result<JobHandle> {
    let payload = CommentJob::new(access_token, api_url, body);
    queue.enqueue(NewJob::new(CommentJob::KIND, &payload)?, deadline)
}
