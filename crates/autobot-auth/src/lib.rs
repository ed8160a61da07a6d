//! GitHub OAuth2 authorization-code flow.
//!
//! [`GithubOAuth::begin_authorization`] produces the URL to send the browser
//! to plus the CSRF state to remember; [`GithubOAuth::complete_authorization`]
//! checks the state echoed on the callback and exchanges the code for an
//! access token. Storage of the state between the two calls belongs to the
//! caller (see `autobot-sessions`).

pub mod error;
pub mod oauth;

pub use error::{AuthError, Result};
pub use oauth::GithubOAuth;
