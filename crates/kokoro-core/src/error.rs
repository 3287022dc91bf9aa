use thiserror::Error;

#[derive(Debug, Error)]
pub enum KokoroError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KokoroError {
    /// Short error code string returned to HTTP clients next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            KokoroError::Config(_) => "CONFIG_ERROR",
            KokoroError::AuthFailed(_) => "AUTH_FAILED",
            KokoroError::Validation(_) => "VALIDATION_ERROR",
            KokoroError::NotFound { .. } => "NOT_FOUND",
            KokoroError::Conflict(_) => "CONFLICT",
            KokoroError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            KokoroError::Database(_) => "DATABASE_ERROR",
            KokoroError::Notify(_) => "NOTIFY_ERROR",
            KokoroError::Serialization(_) => "SERIALIZATION_ERROR",
            KokoroError::Io(_) => "IO_ERROR",
            KokoroError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KokoroError>;
