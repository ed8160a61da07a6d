use thiserror::Error;

/// Every way the authorization round trip can fail.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("OAuth state missing or does not match")]
    StateMismatch,

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("callback carried no authorization code")]
    MissingCode,

    #[error("malformed callback URL: {0}")]
    MalformedCallback(String),

    #[error("token exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("invalid OAuth configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::StateMismatch => "STATE_MISMATCH",
            Self::Denied(_) => "ACCESS_DENIED",
            Self::MissingCode => "MISSING_CODE",
            Self::MalformedCallback(_) => "MALFORMED_CALLBACK",
            Self::ExchangeRejected(_) => "EXCHANGE_REJECTED",
            Self::Transport(_) => "TOKEN_ENDPOINT_UNREACHABLE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
