use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutobotError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AutobotError {
    /// Short error code string used in structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            AutobotError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AutobotError>;
