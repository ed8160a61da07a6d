use autobot_scheduler::Job;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Carries `sha256=<hex>` over the raw JSON body, same scheme as GitHub webhooks.
pub const SIGNATURE_HEADER: &str = "X-Autobot-Signature-256";

/// What the notifier reports for every finished delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub job_id: String,
    pub kind: String,
    /// `"completed"` or `"failed"`.
    pub status: &'static str,
    pub error: Option<String>,
    pub not_before: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn new(job: &Job, result: &Result<(), String>) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind.clone(),
            status: if result.is_ok() { "completed" } else { "failed" },
            error: result.as_ref().err().cloned(),
            not_before: job.not_before,
            finished_at: Utc::now(),
        }
    }
}

/// Reports delivery outcomes to an operator-supplied URL.
#[derive(Clone)]
pub struct DeliveryNotifier {
    http: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl DeliveryNotifier {
    pub fn new(http: reqwest::Client, url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            secret,
        }
    }

    /// POST the outcome. Failures are logged and never affect the job.
    pub async fn notify(&self, outcome: &DeliveryOutcome) {
        let body = match serde_json::to_vec(outcome) {
            Ok(b) => b,
            Err(e) => {
                warn!(job_id = %outcome.job_id, "could not encode delivery outcome: {e}");
                return;
            }
        };

        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            match sign(secret, &body) {
                Some(signature) => request = request.header(SIGNATURE_HEADER, signature),
                None => warn!("invalid notify secret; sending unsigned"),
            }
        }

        match request.body(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(job_id = %outcome.job_id, "delivery outcome sent");
            }
            Ok(resp) => {
                warn!(job_id = %outcome.job_id, status = %resp.status(), "notify endpoint refused outcome");
            }
            Err(e) => warn!(job_id = %outcome.job_id, "notify endpoint unreachable: {e}"),
        }
    }
}

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
