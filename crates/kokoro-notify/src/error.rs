use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Provider is misconfigured (missing key or sender).
    #[error("Notifier configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider rate limited the request (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, NotifyError>;
