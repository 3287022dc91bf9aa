use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur within the job store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store cannot be reached right now (open failure, busy
    /// beyond the timeout, I/O failure, poisoned connection lock).
    #[error("Queue store unavailable: {0}")]
    Unavailable(String),

    /// Any other SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The worker no longer holds the lease on this job (it stalled and was
    /// re-queued or failed by a sweep).
    #[error("Lease lost on job {id}")]
    LeaseLost { id: String },
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::NotADatabase
                        | ErrorCode::ReadOnly
                        | ErrorCode::DiskFull
                ) =>
            {
                QueueError::Unavailable(e.to_string())
            }
            _ => QueueError::Database(e),
        }
    }
}

impl QueueError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_database_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(QueueError::from(err).is_unavailable());
    }

    #[test]
    fn query_errors_stay_database_errors() {
        let err = QueueError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, QueueError::Database(_)));
    }
}
