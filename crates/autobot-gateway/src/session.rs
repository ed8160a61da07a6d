//! Browser session cookie. The cookie only carries the signed session id;
//! auth state lives server-side in the `SessionStore`.

use std::sync::Arc;
use std::time::Duration;

use autobot_core::config::SESSION_COOKIE;
use autobot_core::AccessToken;
use autobot_sessions::BrowserSession;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::GatewayError;

pub fn jar(state: &AppState, headers: &HeaderMap) -> SignedCookieJar {
    SignedCookieJar::from_headers(headers, state.cookie_key.clone())
}

/// The live session named by the cookie, if any.
pub fn current(state: &AppState, jar: &SignedCookieJar) -> Result<Option<BrowserSession>, GatewayError> {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) => Ok(state.sessions.load(cookie.value())?),
        None => Ok(None),
    }
}

/// The current session, or a fresh one with its cookie added to `jar`.
pub fn ensure(
    state: &AppState,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, BrowserSession), GatewayError> {
    if let Some(session) = current(state, &jar)? {
        return Ok((jar, session));
    }
    let session = state.sessions.create()?;
    let jar = jar.add(cookie(session.id.clone(), state.config.session.secure_cookie));
    Ok((jar, session))
}

/// Session id and token when the browser has completed login.
pub fn authenticated(
    state: &AppState,
    jar: &SignedCookieJar,
) -> Result<Option<(String, AccessToken)>, GatewayError> {
    Ok(current(state, jar)?.and_then(|s| {
        let token = s.access_token()?.clone();
        Some((s.id, token))
    }))
}

pub fn cookie(id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn removal() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// Delete expired sessions every `every`, starting immediately. Runs until
/// the task is aborted.
pub async fn purge_expired_periodically(state: Arc<AppState>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match state.sessions.purge_expired() {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired sessions removed"),
            Err(e) => warn!("session purge failed: {e}"),
        }
    }
}
