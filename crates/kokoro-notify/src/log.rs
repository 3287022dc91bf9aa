use async_trait::async_trait;
use tracing::info;

use crate::{error::Result, message::ReminderMessage, Notifier};

/// Writes each reminder to the log instead of delivering it. Default in
/// development so the pipeline runs without provider credentials.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &ReminderMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject(),
            priority = %message.priority,
            scheduled_at = %message.scheduled_at,
            "reminder delivered to log"
        );
        Ok(())
    }
}
