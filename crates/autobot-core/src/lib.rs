//! `autobot-core`: configuration, shared types and the pure conversions
//! (local time → UTC deadline, commit URL → API endpoint) used by every
//! other autobot crate.

pub mod comment;
pub mod config;
pub mod error;
pub mod target;
pub mod time;
pub mod types;

pub use comment::CommentJob;
pub use config::AutobotConfig;
pub use error::{AutobotError, Result};
pub use types::AccessToken;
