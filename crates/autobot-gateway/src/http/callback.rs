use std::sync::Arc;

use autobot_sessions::SessionError;
use axum::{
    extract::{OriginalUri, State},
    http::HeaderMap,
    response::Redirect,
};
use tracing::{info, warn};

use crate::{app::AppState, error::GatewayError, session};

/// GET /callback?code=..&state=..: finish the login and go to the form.
///
/// Every authentication failure clears the pending state and sends the
/// browser back to `/`, which starts over.
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Redirect, GatewayError> {
    let jar = session::jar(&state, &headers);
    let Some(browser) = session::current(&state, &jar)? else {
        warn!("OAuth callback without a session");
        return Ok(Redirect::to("/"));
    };
    let Some(csrf_state) = browser.state.pending_csrf_state().map(str::to_owned) else {
        warn!(session_id = %browser.id, "OAuth callback with no login in progress");
        return Ok(Redirect::to("/"));
    };

    // Rebuild the URL the provider redirected to, as seen from outside any proxy.
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/callback");
    let callback_url = format!(
        "{}{}",
        state.config.gateway.public_url.trim_end_matches('/'),
        path_and_query
    );

    let token = match state.oauth.complete_authorization(&csrf_state, &callback_url).await {
        Ok(token) => token,
        Err(e) => {
            warn!(session_id = %browser.id, code = e.code(), "authorization failed: {e}");
            state.sessions.abandon_authorization(&browser.id)?;
            return Ok(Redirect::to("/"));
        }
    };

    match state
        .sessions
        .complete_authorization(&browser.id, &csrf_state, token)
    {
        Ok(_) => {
            info!(session_id = %browser.id, "login complete");
            Ok(Redirect::to("/schedule"))
        }
        // Another callback for the same state won the race.
        Err(SessionError::InvalidTransition { .. }) => Ok(Redirect::to("/")),
        Err(e) => Err(e.into()),
    }
}
