use autobot_core::config::GithubConfig;
use autobot_core::AccessToken;
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, Result};

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 client for the configured GitHub-compatible host.
#[derive(Clone)]
pub struct GithubOAuth {
    client: OAuthClient,
    scope: String,
    http: reqwest::Client,
}

impl GithubOAuth {
    /// Build the client. `redirect_url` must match the callback registered
    /// with the OAuth app.
    pub fn new(config: &GithubConfig, redirect_url: &str) -> Result<Self> {
        let auth_url = AuthUrl::new(config.authorize_url())
            .map_err(|e| AuthError::InvalidConfig(format!("authorize URL: {e}")))?;
        let token_url = TokenUrl::new(config.token_url())
            .map_err(|e| AuthError::InvalidConfig(format!("token URL: {e}")))?;
        let redirect_url = RedirectUrl::new(redirect_url.to_string())
            .map_err(|e| AuthError::InvalidConfig(format!("redirect URL: {e}")))?;

        // GitHub expects the client credentials in the form body.
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url)
            .set_auth_type(AuthType::RequestBody);

        // Following redirects from the token endpoint opens the client up to SSRF.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            scope: config.scope.clone(),
            http,
        })
    }

    /// Start a login: returns the provider URL to redirect to and the fresh
    /// CSRF state the callback must echo back.
    pub fn begin_authorization(&self) -> (String, String) {
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in self.scope.split_whitespace() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, csrf) = request.url();
        debug!("authorization URL issued");
        (url.to_string(), csrf.secret().clone())
    }

    /// Finish a login from the full callback URL the provider redirected to.
    ///
    /// The echoed state is checked before anything else; on mismatch no
    /// request reaches the token endpoint.
    pub async fn complete_authorization(
        &self,
        csrf_state: &str,
        callback_url: &str,
    ) -> Result<AccessToken> {
        let callback = Url::parse(callback_url)
            .map_err(|e| AuthError::MalformedCallback(e.to_string()))?;
        let param = |name: &str| {
            callback
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        match param("state") {
            Some(state) if state == csrf_state => {}
            _ => {
                warn!("OAuth callback state mismatch");
                return Err(AuthError::StateMismatch);
            }
        }

        if let Some(error) = param("error") {
            let detail = match param("error_description") {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(AuthError::Denied(detail));
        }

        let code = param("code")
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    AuthError::ExchangeRejected(resp.error().to_string())
                }
                RequestTokenError::Parse(_, _) => {
                    AuthError::ExchangeRejected("unexpected token response".to_string())
                }
                RequestTokenError::Request(err) => AuthError::Transport(err.to_string()),
                RequestTokenError::Other(msg) => AuthError::ExchangeRejected(msg),
            })?;

        info!("OAuth token exchange succeeded");
        Ok(AccessToken::new(token.access_token().secret().clone()))
    }
}
