use std::sync::Arc;

use autobot_core::config::SESSION_COOKIE;
use autobot_sessions::SessionError;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use tracing::info;

use crate::{app::AppState, error::GatewayError, session};

/// GET /logout: forget the server-side session and clear the cookie.
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let jar = session::jar(&state, &headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state.sessions.delete(cookie.value()) {
            Ok(()) => info!(session_id = %cookie.value(), "logged out"),
            Err(SessionError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let jar = jar.remove(session::removal());
    Ok((jar, Redirect::to("/")).into_response())
}
