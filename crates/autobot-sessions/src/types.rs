use autobot_core::AccessToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Where a browser is in the OAuth flow.
///
/// ```text
/// Unauthenticated ──begin──▶ AwaitingCallback ──complete──▶ Authenticated
///                      ▲            │  ▲
///                      └──abandon───┘  └─begin (restart)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    /// Redirected to the provider; `csrf_state` must come back on the callback.
    AwaitingCallback { csrf_state: String },
    Authenticated { access_token: AccessToken },
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::AwaitingCallback { .. } => "awaiting_callback",
            AuthState::Authenticated { .. } => "authenticated",
        }
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        match self {
            AuthState::Authenticated { access_token } => Some(access_token),
            _ => None,
        }
    }

    /// The CSRF state stored when the flow began, if one is outstanding.
    pub fn pending_csrf_state(&self) -> Option<&str> {
        match self {
            AuthState::AwaitingCallback { csrf_state } => Some(csrf_state),
            _ => None,
        }
    }

    /// Start (or restart) the flow with a fresh CSRF state.
    pub fn begin(&self, csrf_state: String) -> Result<AuthState> {
        match self {
            AuthState::Authenticated { .. } => Err(SessionError::InvalidTransition {
                from: self.name(),
                to: "awaiting_callback",
            }),
            _ => Ok(AuthState::AwaitingCallback { csrf_state }),
        }
    }

    /// Consume the outstanding CSRF state and store the token.
    ///
    /// Only succeeds while the state issued at `begin` is still the current one,
    /// so a replayed callback cannot log in twice.
    pub fn complete(&self, csrf_state: &str, access_token: AccessToken) -> Result<AuthState> {
        match self {
            AuthState::AwaitingCallback { csrf_state: expected } if expected == csrf_state => {
                Ok(AuthState::Authenticated { access_token })
            }
            _ => Err(SessionError::InvalidTransition {
                from: self.name(),
                to: "authenticated",
            }),
        }
    }
}

/// A server-held browser session, identified by the signed session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSession {
    /// Random UUIDv4, carried in the signed cookie.
    pub id: String,
    pub state: AuthState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl BrowserSession {
    pub fn access_token(&self) -> Option<&AccessToken> {
        self.state.access_token()
    }
}
