//! Delivery worker: turns a fired `commit_comment` job into a POST against
//! the hosting service's REST API.
//!
//! [`CommentPoster`] plugs into the scheduler as its `JobHandler`. Each job
//! gets exactly one attempt; the outcome is recorded on the job row by the
//! scheduler and, when configured, reported to a [`DeliveryNotifier`].

pub mod error;
pub mod notify;
pub mod poster;

pub use error::{DeliveryError, Result};
pub use notify::{DeliveryNotifier, DeliveryOutcome, SIGNATURE_HEADER};
pub use poster::CommentPoster;
