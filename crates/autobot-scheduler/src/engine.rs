use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{error::Result, store::JobStore, types::Job};

/// Executes one claimed job. The returned error text is stored on the job row.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> std::result::Result<(), String>;
}

/// Worker loop: polls the store and runs due jobs at ±poll-interval precision.
///
/// Every claimed job runs on its own task, so a slow delivery never delays
/// another job whose deadline has arrived. At most `max_concurrency` jobs are
/// in flight; anything beyond that stays `pending` until a slot frees up.
pub struct SchedulerEngine {
    store: JobStore,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
    max_concurrency: usize,
    /// A job `running` for longer than this is considered orphaned.
    stale_after: chrono::Duration,
    permits: Arc<Semaphore>,
}

impl SchedulerEngine {
    pub fn new(store: JobStore, handler: Arc<dyn JobHandler>) -> Self {
        let max_concurrency = 8;
        Self {
            store,
            handler,
            poll_interval: Duration::from_secs(1),
            max_concurrency,
            stale_after: chrono::Duration::minutes(5),
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Clamped to at least one slot.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self.permits = Arc::new(Semaphore::new(self.max_concurrency));
        self
    }

    /// Must exceed the longest time a handler can take, or live jobs are
    /// recorded as interrupted.
    pub fn with_stale_after(mut self, stale_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn stale_after(&self) -> chrono::Duration {
        self.stale_after
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true` (or its
    /// sender is dropped), then waits for in-flight jobs to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            max_concurrency = self.max_concurrency,
            "scheduler engine started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        let in_flight = self.max_concurrency - self.permits.available_permits();
        if in_flight > 0 {
            info!(in_flight, "waiting for running jobs");
        }
        let _drained = self.permits.acquire_many(self.max_concurrency as u32).await;
        info!("scheduler engine stopped");
    }

    /// One poll: recover orphaned rows, claim what is due at `now`, spawn handlers.
    ///
    /// Returns the number of jobs started. Must be called inside a Tokio runtime.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        self.store.mark_stale_running(now - self.stale_after, now)?;

        let mut permits: Vec<OwnedSemaphorePermit> = Vec::new();
        while let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            permits.push(permit);
        }
        if permits.is_empty() {
            return Ok(0);
        }

        let jobs = self.store.claim_due(now, permits.len())?;
        let started = jobs.len();
        for (job, permit) in jobs.into_iter().zip(permits) {
            self.spawn(job, permit);
        }
        Ok(started)
    }

    fn spawn(&self, job: Job, permit: OwnedSemaphorePermit) {
        let store = self.store.clone();
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let _permit = permit;
            let late_by = Utc::now() - job.not_before;
            info!(job_id = %job.id, kind = %job.kind, late_ms = late_by.num_milliseconds(), "executing job");

            let outcome = handler.handle(&job).await;
            match &outcome {
                Ok(()) => info!(job_id = %job.id, "job completed"),
                Err(e) => warn!(job_id = %job.id, error = %e, "job failed"),
            }
            if let Err(e) = store.finish(&job.id, &outcome, Utc::now()) {
                error!(job_id = %job.id, "could not record job outcome: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, NewJob};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::{mpsc, Notify};

    /// Reports each job's tag on a channel; tags listed in `gates` block
    /// until their `Notify` fires, and tags in `fail` return an error.
    #[derive(Default)]
    struct ScriptedHandler {
        started: Mutex<Option<mpsc::UnboundedSender<String>>>,
        gates: HashMap<String, Arc<Notify>>,
        fail: Vec<String>,
    }

    impl ScriptedHandler {
        fn with_channel() -> (Self, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    started: Mutex::new(Some(tx)),
                    ..Default::default()
                },
                rx,
            )
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, job: &Job) -> std::result::Result<(), String> {
            let payload: serde_json::Value = job.decode().map_err(|e| e.to_string())?;
            let tag = payload["tag"].as_str().unwrap_or_default().to_string();
            if let Some(tx) = self.started.lock().unwrap().as_ref() {
                let _ = tx.send(tag.clone());
            }
            if let Some(gate) = self.gates.get(&tag) {
                gate.notified().await;
            }
            if self.fail.contains(&tag) {
                return Err(format!("{tag} exploded"));
            }
            Ok(())
        }
    }

    fn new_job(tag: &str) -> NewJob {
        NewJob::new("test", &serde_json::json!({ "tag": tag })).unwrap()
    }

    async fn wait_for_status(store: &JobStore, id: &str, status: JobStatus) -> Job {
        for _ in 0..200 {
            let job = store.get(id).unwrap().unwrap();
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {status}");
    }

    #[tokio::test]
    async fn past_deadline_runs_on_first_tick() {
        let store = JobStore::open_in_memory().unwrap();
        let (handler, mut started) = ScriptedHandler::with_channel();
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler));

        let now = Utc::now();
        let handle = store.insert(new_job("late"), now - ChronoDuration::days(1)).unwrap();

        assert_eq!(engine.tick(now).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("late"));
        let job = wait_for_status(&store, &handle.id, JobStatus::Completed).await;
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn job_never_runs_before_its_deadline() {
        let store = JobStore::open_in_memory().unwrap();
        let (handler, mut started) = ScriptedHandler::with_channel();
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler));

        let now = Utc::now();
        let deadline = now + ChronoDuration::hours(3);
        let handle = store.insert(new_job("later"), deadline).unwrap();

        assert_eq!(engine.tick(now).unwrap(), 0);
        assert_eq!(engine.tick(deadline - ChronoDuration::milliseconds(1)).unwrap(), 0);
        assert_eq!(store.get(&handle.id).unwrap().unwrap().status, JobStatus::Pending);

        assert_eq!(engine.tick(deadline).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn two_jobs_with_one_token_fire_independently() {
        let store = JobStore::open_in_memory().unwrap();
        let (mut handler, mut started) = ScriptedHandler::with_channel();
        let first_gate = Arc::new(Notify::new());
        handler.gates.insert("first".to_string(), Arc::clone(&first_gate));
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler));

        let now = Utc::now();
        let t1 = now + ChronoDuration::minutes(1);
        let t2 = now + ChronoDuration::minutes(2);
        let first = store.insert(new_job("first"), t1).unwrap();
        let second = store.insert(new_job("second"), t2).unwrap();

        // First deadline: only the first job starts, and it hangs.
        assert_eq!(engine.tick(t1).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("first"));
        assert_eq!(store.get(&second.id).unwrap().unwrap().status, JobStatus::Pending);

        // Second deadline: the second job runs to completion regardless.
        assert_eq!(engine.tick(t2).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("second"));
        wait_for_status(&store, &second.id, JobStatus::Completed).await;
        assert_eq!(store.get(&first.id).unwrap().unwrap().status, JobStatus::Running);

        first_gate.notify_one();
        wait_for_status(&store, &first.id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn handler_error_is_recorded_without_retry() {
        let store = JobStore::open_in_memory().unwrap();
        let (mut handler, mut started) = ScriptedHandler::with_channel();
        handler.fail.push("doomed".to_string());
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler));

        let now = Utc::now();
        let handle = store.insert(new_job("doomed"), now).unwrap();
        engine.tick(now).unwrap();
        assert_eq!(started.recv().await.as_deref(), Some("doomed"));

        let job = wait_for_status(&store, &handle.id, JobStatus::Failed).await;
        assert_eq!(job.last_error.as_deref(), Some("doomed exploded"));
        assert_eq!(engine.tick(now + ChronoDuration::hours(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrency_limit_leaves_extra_jobs_pending() {
        let store = JobStore::open_in_memory().unwrap();
        let (mut handler, mut started) = ScriptedHandler::with_channel();
        let gate = Arc::new(Notify::new());
        handler.gates.insert("a".to_string(), Arc::clone(&gate));
        handler.gates.insert("b".to_string(), Arc::clone(&gate));
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler)).with_max_concurrency(1);

        let now = Utc::now();
        store.insert(new_job("a"), now - ChronoDuration::seconds(2)).unwrap();
        let b = store.insert(new_job("b"), now - ChronoDuration::seconds(1)).unwrap();

        assert_eq!(engine.tick(now).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("a"));
        assert_eq!(engine.tick(now).unwrap(), 0);
        assert_eq!(store.get(&b.id).unwrap().unwrap().status, JobStatus::Pending);

        gate.notify_one();
        // Slot frees once "a" finishes; poll until "b" is picked up.
        let mut picked = 0;
        for _ in 0..200 {
            picked = engine.tick(Utc::now()).unwrap();
            if picked == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(picked, 1);
        assert_eq!(started.recv().await.as_deref(), Some("b"));
        gate.notify_one();
        wait_for_status(&store, &b.id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn orphaned_running_job_is_interrupted_not_rerun() {
        let store = JobStore::open_in_memory().unwrap();
        let (handler, _started) = ScriptedHandler::with_channel();
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler))
            .with_stale_after(ChronoDuration::minutes(1));

        // Simulate a previous worker that claimed the job and died.
        let now = Utc::now();
        let handle = store.insert(new_job("orphan"), now).unwrap();
        store.claim_due(now, 1).unwrap();

        assert_eq!(engine.tick(now + ChronoDuration::minutes(2)).unwrap(), 0);
        let job = store.get(&handle.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Interrupted);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn slow_job_inside_stale_window_keeps_its_outcome() {
        let store = JobStore::open_in_memory().unwrap();
        let (mut handler, mut started) = ScriptedHandler::with_channel();
        let gate = Arc::new(Notify::new());
        handler.gates.insert("slow".to_string(), Arc::clone(&gate));
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler))
            .with_stale_after(ChronoDuration::minutes(10));

        let now = Utc::now();
        let handle = store.insert(new_job("slow"), now).unwrap();
        assert_eq!(engine.tick(now).unwrap(), 1);
        assert_eq!(started.recv().await.as_deref(), Some("slow"));

        // Later polls while the handler is still busy leave the row alone.
        for secs in [1, 150, 599] {
            engine.tick(now + ChronoDuration::seconds(secs)).unwrap();
            assert_eq!(store.get(&handle.id).unwrap().unwrap().status, JobStatus::Running);
        }

        gate.notify_one();
        let job = wait_for_status(&store, &handle.id, JobStatus::Completed).await;
        assert!(job.last_error.is_none());
    }

    #[tokio::test]
    async fn run_loop_delivers_and_stops_on_shutdown() {
        let store = JobStore::open_in_memory().unwrap();
        let (handler, mut started) = ScriptedHandler::with_channel();
        let engine = SchedulerEngine::new(store.clone(), Arc::new(handler))
            .with_poll_interval(Duration::from_millis(10));

        let handle = store.insert(new_job("looped"), Utc::now()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(shutdown_rx));

        assert_eq!(started.recv().await.as_deref(), Some("looped"));
        wait_for_status(&store, &handle.id, JobStatus::Completed).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("engine stops")
            .unwrap();
    }
}
