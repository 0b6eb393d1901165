use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Task token cannot be empty")]
    EmptyToken,
}

pub type ApprovalResult<T> = Result<T, ApprovalError>;
