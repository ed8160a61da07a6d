//! Deferred comment payload, shared between the scheduler and the delivery worker.

use serde::{Deserialize, Serialize};

use crate::types::AccessToken;

/// Stored as a JSON string in the `jobs.payload` column.
///
/// Created by the schedule form handler; decoded by the delivery worker when
/// the scheduler fires the job. The token is captured at schedule time and
/// may have expired by the time the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentJob {
    /// Bearer token of the user who scheduled the comment.
    pub access_token: AccessToken,
    /// Fully-resolved `.../commits/<sha>/comments` endpoint.
    pub api_url: String,
    /// Markdown comment text, posted verbatim.
    pub body: String,
}

impl CommentJob {
    /// Value of the `jobs.kind` column for comment deliveries.
    pub const KIND: &'static str = "commit_comment";

    pub fn new(access_token: AccessToken, api_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            access_token,
            api_url: api_url.into(),
            body: body.into(),
        }
    }
}
