use std::sync::Arc;

use autobot_core::target::rewrite_commit_url;
use autobot_core::time::{to_local_string, to_utc_deadline};
use autobot_scheduler::{schedule_comment, SchedulerError};
use axum::{
    extract::{rejection::FormRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::SecondsFormat;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    app::AppState,
    error::GatewayError,
    pages::{self, FormValues, Notice},
    session,
};

#[derive(Debug, Deserialize)]
pub struct ScheduleForm {
    pub url: String,
    pub comment: String,
    /// `YYYY-MM-DDTHH:MM` in the configured zone.
    pub datetime: String,
}

impl ScheduleForm {
    fn values(&self) -> FormValues<'_> {
        FormValues {
            url: &self.url,
            comment: &self.comment,
            datetime: &self.datetime,
        }
    }
}

fn render(state: &AppState, status: StatusCode, values: FormValues<'_>, notice: Notice<'_>) -> Response {
    let page = pages::schedule(
        &state.config.github.base_url,
        state.timezone.name(),
        values,
        notice,
    );
    (status, page).into_response()
}

/// GET /schedule
pub async fn schedule_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let jar = session::jar(&state, &headers);
    if session::authenticated(&state, &jar)?.is_none() {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(render(&state, StatusCode::OK, FormValues::default(), Notice::None))
}

/// POST /schedule: validate, normalise and enqueue one comment.
///
/// Input problems re-render the form with the submitted values (422); an
/// unreachable queue does the same with 503 so nothing is silently lost.
/// The session is checked before the body is looked at.
pub async fn schedule_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<ScheduleForm>, FormRejection>,
) -> Result<Response, GatewayError> {
    let jar = session::jar(&state, &headers);
    let Some((session_id, token)) = session::authenticated(&state, &jar)? else {
        return Ok(Redirect::to("/").into_response());
    };
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    let reject = |status: StatusCode, message: &str| {
        render(&state, status, form.values(), Notice::Error(message))
    };

    let github = &state.config.github;
    let api_url = match rewrite_commit_url(&form.url, &github.base_url, &github.api_root) {
        Ok(url) => url,
        Err(e) => return Ok(reject(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())),
    };
    if form.comment.trim().is_empty() {
        return Ok(reject(StatusCode::UNPROCESSABLE_ENTITY, "comment must not be empty"));
    }
    let deadline = match to_utc_deadline(&form.datetime, state.timezone) {
        Ok(deadline) => deadline,
        Err(e) => return Ok(reject(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())),
    };

    let handle = match schedule_comment(state.queue.as_ref(), token, &api_url, &form.comment, deadline) {
        Ok(handle) => handle,
        Err(SchedulerError::QueueUnavailable(reason)) => {
            warn!(%session_id, %reason, "enqueue failed");
            return Ok(reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "The job queue is unavailable; your comment was not scheduled. Please try again.",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    info!(%session_id, job_id = %handle.id, %api_url, not_before = %handle.not_before, "comment scheduled");
    let local = to_local_string(handle.not_before, state.timezone);
    let utc = handle.not_before.to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(render(
        &state,
        StatusCode::OK,
        FormValues::default(),
        Notice::Scheduled {
            job_id: &handle.id,
            local: &local,
            utc: &utc,
        },
    ))
}
