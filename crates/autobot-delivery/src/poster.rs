use std::time::Duration;

use async_trait::async_trait;
use autobot_core::CommentJob;
use autobot_scheduler::{Job, JobHandler};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::{DeliveryError, Result};
use crate::notify::{DeliveryNotifier, DeliveryOutcome};

const GITHUB_JSON: &str = "application/vnd.github+json";
const AGENT: &str = concat!("autobot/", env!("CARGO_PKG_VERSION"));

/// Posts scheduled commit comments.
pub struct CommentPoster {
    http: reqwest::Client,
    notifier: Option<DeliveryNotifier>,
}

impl CommentPoster {
    /// `timeout` bounds each API call end to end.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: DeliveryNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Decode a claimed job and deliver it.
    pub async fn deliver(&self, job: &Job) -> Result<()> {
        if job.kind != CommentJob::KIND {
            return Err(DeliveryError::UnknownKind(job.kind.clone()));
        }
        let comment: CommentJob = job.decode()?;
        self.post(&comment).await
    }

    /// One POST of `{"body": ...}` to the comments endpoint. No retry.
    pub async fn post(&self, comment: &CommentJob) -> Result<()> {
        debug!(api_url = %comment.api_url, "posting commit comment");
        let response = self
            .http
            .post(&comment.api_url)
            .bearer_auth(comment.access_token.secret())
            .header(ACCEPT, GITHUB_JSON)
            .header(USER_AGENT, AGENT)
            .json(&json!({ "body": comment.body }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(DeliveryError::TokenRejected);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("<unreadable body: {e}>"),
        };
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl JobHandler for CommentPoster {
    async fn handle(&self, job: &Job) -> std::result::Result<(), String> {
        let result = self.deliver(job).await.map_err(|e| e.to_string());
        match &result {
            Ok(()) => info!(job_id = %job.id, "comment delivered"),
            Err(e) => error!(job_id = %job.id, error = %e, "comment delivery failed"),
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(&DeliveryOutcome::new(job, &result)).await;
        }
        result
    }
}
