use autobot_scheduler::SchedulerError;
use autobot_sessions::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Failures a handler cannot turn into a page of its own.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("session store: {0}")]
    Session(#[from] SessionError),

    #[error("job queue: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        let status = match &self {
            GatewayError::Session(SessionError::Unavailable)
            | GatewayError::Scheduler(SchedulerError::QueueUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, status.canonical_reason().unwrap_or("error")).into_response()
    }
}
