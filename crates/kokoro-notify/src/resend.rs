use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{NotifyError, Result},
    message::ReminderMessage,
    Notifier,
};

/// E-mail delivery through the Resend HTTP API (`POST /emails`).
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
    text: String,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

impl ResendNotifier {
    pub fn new(api_key: String, from: String, base_url: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(NotifyError::Config("notifier.api_key is empty".into()));
        }
        if from.trim().is_empty() {
            return Err(NotifyError::Config("notifier.from is empty".into()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            from,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn name(&self) -> &str {
        "resend"
    }

    async fn send(&self, message: &ReminderMessage) -> Result<()> {
        let body = SendEmail {
            from: &self.from,
            to: [message.to.as_str()],
            subject: message.subject(),
            html: message.render_html(),
            text: message.render_text(),
        };

        let resp = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            warn!(?retry_after_secs, "Resend rate limited the request");
            return Err(NotifyError::RateLimited { retry_after_secs });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Resend API error");
            return Err(NotifyError::Rejected { status, body: text });
        }

        let sent: SendEmailResponse = resp.json().await?;
        debug!(email_id = ?sent.id, to = %message.to, "reminder e-mail accepted");
        Ok(())
    }
}
