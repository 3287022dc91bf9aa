use chrono::{DateTime, Utc};
use kokoro_core::types::Priority;

use crate::error::{ReminderError, Result};
use crate::model::{to_millis_precision, NewReminder};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

fn invalid(msg: impl Into<String>) -> ReminderError {
    ReminderError::Validation(msg.into())
}

pub fn title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(invalid("title is required"));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(invalid(format!(
            "title must be at most {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

/// Blank descriptions are stored as absent.
pub fn description(raw: Option<&str>) -> Result<Option<String>> {
    let Some(description) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(invalid(format!(
            "description must be at most {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(Some(description.to_string()))
}

/// Trimmed and lowercased. One `@` with something on both sides.
pub fn email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(invalid("email is required"));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(invalid(format!("invalid email address: {email}")));
    }
    Ok(email)
}

pub fn scheduled_at(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if at <= now {
        return Err(invalid("scheduledAt must be in the future"));
    }
    Ok(to_millis_precision(at))
}

pub fn priority(priority: Priority) -> Result<Priority> {
    if priority == Priority::Urgent {
        return Err(invalid("priority must be one of low, medium, high"));
    }
    Ok(priority)
}

/// Check and normalize a creation request against `now`.
pub fn new_reminder(input: NewReminder, now: DateTime<Utc>) -> Result<NewReminder> {
    Ok(NewReminder {
        title: title(&input.title)?,
        description: description(input.description.as_deref())?,
        scheduled_at: scheduled_at(input.scheduled_at, now)?,
        recurrence: input.recurrence,
        priority: priority(input.priority)?,
        email: email(&input.email)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kokoro_core::types::Recurrence;

    fn input(now: DateTime<Utc>) -> NewReminder {
        NewReminder {
            title: "  Pay rent ".into(),
            description: Some("   ".into()),
            scheduled_at: now + Duration::hours(1),
            recurrence: Recurrence::Monthly,
            priority: Priority::High,
            email: " Ada@Example.COM ".into(),
        }
    }

    #[test]
    fn normalizes_a_valid_request() {
        let now = Utc::now();
        let out = new_reminder(input(now), now).unwrap();
        assert_eq!(out.title, "Pay rent");
        assert_eq!(out.description, None);
        assert_eq!(out.email, "ada@example.com");
    }

    #[test]
    fn rejects_past_and_present_instants() {
        let now = Utc::now();
        let mut past = input(now);
        past.scheduled_at = now - Duration::seconds(1);
        assert!(matches!(
            new_reminder(past, now),
            Err(ReminderError::Validation(_))
        ));
        let mut exactly_now = input(now);
        exactly_now.scheduled_at = now;
        assert!(new_reminder(exactly_now, now).is_err());
    }

    #[test]
    fn title_limits() {
        assert!(title("   ").is_err());
        assert!(title(&"a".repeat(TITLE_MAX_CHARS)).is_ok());
        assert!(title(&"a".repeat(TITLE_MAX_CHARS + 1)).is_err());
        // counted in characters, not bytes
        assert!(title(&"é".repeat(TITLE_MAX_CHARS)).is_ok());
    }

    #[test]
    fn description_limits() {
        assert_eq!(description(None).unwrap(), None);
        assert!(description(Some(&"d".repeat(DESCRIPTION_MAX_CHARS + 1))).is_err());
        assert_eq!(
            description(Some(" note ")).unwrap().as_deref(),
            Some("note")
        );
    }

    #[test]
    fn email_shapes() {
        assert!(email("").is_err());
        assert!(email("no-at-sign").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a@").is_err());
        assert!(email("a@b@c").is_err());
        assert!(email("a b@c.d").is_err());
        assert_eq!(email("X@Y.Z").unwrap(), "x@y.z");
    }

    #[test]
    fn urgent_is_queue_only() {
        assert!(priority(Priority::Urgent).is_err());
        assert_eq!(priority(Priority::Low).unwrap(), Priority::Low);
    }
}
