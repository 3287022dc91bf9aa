use thiserror::Error;

/// Outcome of a failed handler run, deciding whether the job is retried.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient failure; retried with backoff while attempts remain.
    #[error("{0}")]
    Retryable(String),

    /// Retrying cannot help (bad payload, invariant broken). Fails at once.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Retryable(_))
    }
}
