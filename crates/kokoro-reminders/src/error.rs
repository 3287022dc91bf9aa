use kokoro_core::error::KokoroError;
use kokoro_core::types::ReminderStatus;
use kokoro_notify::NotifyError;
use kokoro_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Reminder not found: {id}")]
    NotFound { id: String },

    #[error("Reminder is {from}; cannot move to {to}")]
    InvalidTransition {
        from: ReminderStatus,
        to: ReminderStatus,
    },

    #[error("Record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Delivery failed: {0}")]
    Notify(#[from] NotifyError),

    /// A queued payload could not be decoded.
    #[error("Malformed job payload: {0}")]
    Payload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReminderError {
    /// Whether running the same operation again could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReminderError::Store(_)
                | ReminderError::Queue(_)
                | ReminderError::Notify(_)
                | ReminderError::Internal(_)
        )
    }
}

impl From<ReminderError> for KokoroError {
    fn from(e: ReminderError) -> Self {
        match e {
            ReminderError::Validation(msg) => KokoroError::Validation(msg),
            ReminderError::NotFound { id } => KokoroError::NotFound {
                what: "Reminder",
                id,
            },
            e @ ReminderError::InvalidTransition { .. } => KokoroError::Conflict(e.to_string()),
            ReminderError::Store(e) => KokoroError::Database(e.to_string()),
            ReminderError::Queue(e) => KokoroError::QueueUnavailable(e.to_string()),
            ReminderError::Notify(e) => KokoroError::Notify(e.to_string()),
            ReminderError::Payload(msg) => KokoroError::Validation(msg),
            ReminderError::Internal(msg) => KokoroError::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReminderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_the_top_level_codes() {
        let e: KokoroError = ReminderError::NotFound { id: "r1".into() }.into();
        assert_eq!(e.code(), "NOT_FOUND");

        let e: KokoroError = ReminderError::InvalidTransition {
            from: ReminderStatus::Sent,
            to: ReminderStatus::Cancelled,
        }
        .into();
        assert_eq!(e.code(), "CONFLICT");
        assert!(e.to_string().contains("Reminder is sent"));

        let e: KokoroError = ReminderError::Validation("title is required".into()).into();
        assert_eq!(e.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn only_infrastructure_errors_are_transient() {
        assert!(ReminderError::Internal("lock".into()).is_transient());
        assert!(!ReminderError::Payload("bad".into()).is_transient());
        assert!(!ReminderError::Validation("bad".into()).is_transient());
    }
}
