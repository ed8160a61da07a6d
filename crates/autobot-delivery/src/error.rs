use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no handler for job kind '{0}'")]
    UnknownKind(String),

    #[error("undecodable job payload: {0}")]
    BadPayload(#[from] serde_json::Error),

    /// 401: the token captured at schedule time expired or was revoked.
    #[error("access token rejected (expired or revoked)")]
    TokenRejected,

    #[error("API rejected comment: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
