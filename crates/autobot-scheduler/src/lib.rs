//! `autobot-scheduler`: durable deferred-job queue with SQLite persistence.
//!
//! # Overview
//!
//! Producers call [`JobQueue::enqueue`] with a payload and a `not_before`
//! instant; the row is written to the `jobs` table before the call returns.
//! A [`SchedulerEngine`] (in the same process or another one sharing the
//! SQLite file) polls for due rows, claims them atomically and hands each to
//! the registered [`JobHandler`] on its own task.
//!
//! # Job lifecycle
//!
//! | Status        | Meaning                                                |
//! |---------------|--------------------------------------------------------|
//! | `pending`     | Waiting for `not_before`                               |
//! | `running`     | Claimed by a worker, handler in flight                 |
//! | `completed`   | Handler returned `Ok`                                  |
//! | `failed`      | Handler returned `Err`; error text kept in `last_error`|
//! | `cancelled`   | Cancelled while still pending                          |
//! | `interrupted` | Worker died mid-run; never retried                     |

pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod store;
pub mod types;

pub use engine::{JobHandler, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use queue::{schedule_comment, JobQueue};
pub use store::JobStore;
pub use types::{Job, JobHandle, JobStatus, NewJob};
