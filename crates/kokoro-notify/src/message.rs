use chrono::{DateTime, Utc};
use kokoro_core::types::Priority;
use serde::Serialize;

/// Everything a provider needs to deliver one reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    pub to: String,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub priority: Priority,
}

impl ReminderMessage {
    pub fn subject(&self) -> String {
        format!("Reminder: {}", self.title)
    }

    pub fn formatted_date(&self) -> String {
        self.scheduled_at.format("%A, %B %-d, %Y").to_string()
    }

    pub fn formatted_time(&self) -> String {
        self.scheduled_at.format("%I:%M %p UTC").to_string()
    }

    /// Plain-text body.
    pub fn render_text(&self) -> String {
        let mut body = format!(
            "Time for your reminder\n\n{} ({} priority)\n",
            self.title, self.priority
        );
        if let Some(description) = &self.description {
            body.push_str(&format!("\n{description}\n"));
        }
        body.push_str(&format!(
            "\nDate: {}\nTime: {}\n\nYou're receiving this because you created a reminder on Kokoro.\n",
            self.formatted_date(),
            self.formatted_time()
        ));
        body
    }

    /// HTML body. User-supplied text is escaped.
    pub fn render_html(&self) -> String {
        let color = priority_color(self.priority);
        let description = self
            .description
            .as_deref()
            .map(|d| {
                format!(
                    r#"<p style="margin:8px 0 0 0;color:#6B7280;font-size:16px;line-height:1.5;">{}</p>"#,
                    escape_html(d)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"><title>Reminder from Kokoro</title></head>
  <body style="margin:0;padding:40px 20px;font-family:-apple-system,'Segoe UI',Roboto,Arial,sans-serif;background-color:#FBF9F7;">
    <div style="max-width:600px;margin:0 auto;background:#FFFFFF;border-radius:16px;overflow:hidden;">
      <div style="background-color:#E07A5F;padding:32px;text-align:center;color:#FFFFFF;font-size:24px;font-weight:700;">Kokoro</div>
      <div style="padding:40px 32px;">
        <h1 style="margin:0 0 8px 0;color:#1F2937;font-size:24px;">Time for your reminder</h1>
        <p style="margin:0 0 24px 0;color:#6B7280;font-size:16px;">Here's what you wanted to remember:</p>
        <div style="background:#F9FAFB;border-radius:12px;border:1px solid #E5E7EB;padding:24px;">
          <span style="background-color:{color}20;color:{color};font-size:12px;font-weight:600;padding:4px 12px;border-radius:9999px;text-transform:uppercase;">{priority} priority</span>
          <h2 style="margin:16px 0 0 0;color:#1F2937;font-size:20px;">{title}</h2>
          {description}
          <p style="margin:16px 0 0 0;color:#374151;font-size:14px;">{date} &middot; {time}</p>
        </div>
      </div>
      <div style="background:#F9FAFB;padding:24px 32px;text-align:center;color:#9CA3AF;font-size:14px;border-top:1px solid #E5E7EB;">
        You're receiving this because you created a reminder on Kokoro.
      </div>
    </div>
  </body>
</html>"#,
            priority = self.priority,
            title = escape_html(&self.title),
            date = self.formatted_date(),
            time = self.formatted_time(),
        )
    }
}

fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "#6B7280",
        Priority::Medium => "#D97706",
        Priority::High | Priority::Urgent => "#DC2626",
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
