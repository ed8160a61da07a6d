use std::sync::Arc;

use autobot_auth::GithubOAuth;
use autobot_core::AutobotConfig;
use autobot_scheduler::JobQueue;
use autobot_sessions::SessionStore;
use axum::{routing::get, Router};
use axum_extra::extract::cookie::Key;
use chrono_tz::Tz;
use sha2::{Digest, Sha512};
use tracing::warn;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: AutobotConfig,
    /// Parsed `schedule.timezone`.
    pub timezone: Tz,
    pub oauth: GithubOAuth,
    pub sessions: SessionStore,
    pub queue: Arc<dyn JobQueue>,
    /// Signs the session cookie.
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(
        config: AutobotConfig,
        timezone: Tz,
        oauth: GithubOAuth,
        sessions: SessionStore,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let cookie_key = cookie_key(config.session.secret.as_deref());
        Self {
            config,
            timezone,
            oauth,
            sessions,
            queue,
            cookie_key,
        }
    }
}

/// Stretch the configured secret to the 64 bytes `Key` needs. Without one,
/// sessions only survive until the next restart.
fn cookie_key(secret: Option<&str>) -> Key {
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
        None => {
            warn!("session.secret not set; using an ephemeral cookie key");
            Key::generate()
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::landing::landing_handler))
        .route("/callback", get(crate::http::callback::callback_handler))
        .route(
            "/schedule",
            get(crate::http::schedule::schedule_form).post(crate::http::schedule::schedule_submit),
        )
        .route("/logout", get(crate::http::logout::logout_handler))
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
