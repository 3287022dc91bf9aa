//! `kokoro-notify`: delivery of due reminders to their owners.
//!
//! Providers implement [`Notifier`]. [`build_notifier`] picks one from
//! configuration: `resend` sends e-mail through the Resend API, `log` only
//! writes the message to the tracing output.

pub mod error;
pub mod log;
pub mod message;
pub mod resend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kokoro_core::config::{NotifierConfig, NotifierProvider};

pub use error::{NotifyError, Result};
pub use log::LogNotifier;
pub use message::ReminderMessage;
pub use resend::ResendNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Deliver one reminder. Any error is treated as transient by callers.
    async fn send(&self, message: &ReminderMessage) -> Result<()>;
}

/// Build the configured provider.
pub fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match config.provider {
        NotifierProvider::Log => Ok(Arc::new(LogNotifier)),
        NotifierProvider::Resend => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| NotifyError::Config("notifier.api_key is required for resend".into()))?;
            let from = config
                .from
                .clone()
                .ok_or_else(|| NotifyError::Config("notifier.from is required for resend".into()))?;
            Ok(Arc::new(ResendNotifier::new(
                api_key,
                from,
                config.base_url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}
