use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::{app::AppState, error::GatewayError, pages, session};

/// GET /: straight to the form when logged in, otherwise start a login.
pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let (jar, browser) = session::ensure(&state, session::jar(&state, &headers))?;
    if browser.access_token().is_some() {
        return Ok((jar, Redirect::to("/schedule")).into_response());
    }

    // A reload issues a new state; only the latest link can complete.
    let (authorize_url, csrf_state) = state.oauth.begin_authorization();
    state.sessions.begin_authorization(&browser.id, csrf_state)?;
    debug!(session_id = %browser.id, "login page served");
    Ok((jar, pages::login(&authorize_url)).into_response())
}

#[cfg(test)]
mod tests {
    use crate::app::tests::{body_text, location, logged_in, send, test_state};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };

    #[tokio::test]
    async fn anonymous_visitor_gets_login_link_and_cookie() {
        let (state, _) = test_state();
        let response = send(&state, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("autobot_session="));
        assert!(set_cookie.contains("HttpOnly"));

        let page = body_text(response).await;
        assert!(page.contains("https://github.com/login/oauth/authorize?"));
        assert!(page.contains("client_id=client-123"));
    }

    #[tokio::test]
    async fn pending_state_is_stored_server_side() {
        let (state, _) = test_state();
        let response = send(&state, Request::get("/").body(Body::empty()).unwrap()).await;
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let page = body_text(response).await;

        // Second visit reuses the session and rotates the state.
        let again = send(
            &state,
            Request::get("/").header(header::COOKIE, &cookie).body(Body::empty()).unwrap(),
        )
        .await;
        assert!(again.headers().get(header::SET_COOKIE).is_none());
        assert_ne!(body_text(again).await, page);
    }

    #[tokio::test]
    async fn authenticated_visitor_goes_to_form() {
        let (state, _) = test_state();
        let (_, cookie) = logged_in(&state);
        let response = send(
            &state,
            Request::get("/").header(header::COOKIE, cookie).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/schedule");
    }

    #[tokio::test]
    async fn tampered_cookie_starts_a_new_session() {
        let (state, _) = test_state();
        let (id, _) = logged_in(&state);
        let forged = format!("autobot_session={id}");
        let response = send(
            &state,
            Request::get("/").header(header::COOKIE, forged).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
    }
}
