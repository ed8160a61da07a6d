use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist or has expired.
    #[error("session not found: {id}")]
    NotFound { id: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored auth state could not be encoded or decoded.
    #[error("corrupt session state: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The requested transition is not allowed from the current state.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// The store mutex was poisoned by a panicking thread.
    #[error("session store unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, SessionError>;
