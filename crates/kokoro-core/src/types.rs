use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of every queue key owned by a reminder. One live job per key.
pub const JOB_KEY_PREFIX: &str = "reminder:";

/// Name given to queued reminder deliveries.
pub const SEND_REMINDER_JOB: &str = "send-reminder";

/// Opaque owner identifier handed over by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a reminder (UUIDv7, time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderId(pub String);

impl ReminderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deduplication key of the queued delivery for this reminder.
    pub fn job_key(&self) -> String {
        format!("{JOB_KEY_PREFIX}{}", self.0)
    }

    /// Inverse of [`ReminderId::job_key`].
    pub fn from_job_key(key: &str) -> Option<Self> {
        key.strip_prefix(JOB_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }
}

impl Default for ReminderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReminderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReminderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery priority. `Urgent` exists at the queue level only; reminders
/// carry one of the other three.
///
/// Ordering follows service order: `Urgent > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Queue rank; lower ranks are served first among jobs due at the same instant.
    pub fn rank(self) -> u32 {
        match self {
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    pub fn is_recurring(self) -> bool {
        self != Recurrence::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            "yearly" => Ok(Recurrence::Yearly),
            other => Err(format!("unknown recurrence: {other}")),
        }
    }
}

/// Reminder lifecycle status. Only `pending` moves; the other three are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: ReminderStatus) -> bool {
        self == ReminderStatus::Pending && next != ReminderStatus::Pending
    }

    pub fn is_terminal(self) -> bool {
        self != ReminderStatus::Pending
    }

    /// Delivery already happened or was called off; executions must not send again.
    pub fn is_settled(self) -> bool {
        matches!(self, ReminderStatus::Sent | ReminderStatus::Cancelled)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReminderStatus::Pending),
            "sent" => Ok(ReminderStatus::Sent),
            "failed" => Ok(ReminderStatus::Failed),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_round_trips_through_the_prefix() {
        let id = ReminderId::from("0192-abc");
        assert_eq!(id.job_key(), "reminder:0192-abc");
        assert_eq!(ReminderId::from_job_key("reminder:0192-abc"), Some(id));
        assert_eq!(ReminderId::from_job_key("reminder:"), None);
        assert_eq!(ReminderId::from_job_key("other:1"), None);
    }

    #[test]
    fn priority_ordering_matches_service_order() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::Urgent.rank() < Priority::Low.rank());
        assert_eq!(Priority::High.rank(), 2);
    }

    #[test]
    fn status_transitions() {
        use ReminderStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Sent));
        assert!(!Failed.can_transition_to(Cancelled));
        assert!(Sent.is_settled() && Cancelled.is_settled());
        assert!(!Failed.is_settled());
        assert!(Failed.is_terminal() && !Pending.is_terminal());
    }

    #[test]
    fn enums_parse_their_wire_names() {
        assert_eq!("weekly".parse::<Recurrence>(), Ok(Recurrence::Weekly));
        assert_eq!("urgent".parse::<Priority>(), Ok(Priority::Urgent));
        assert_eq!("cancelled".parse::<ReminderStatus>(), Ok(ReminderStatus::Cancelled));
        assert!("hourly".parse::<Recurrence>().is_err());
        assert_eq!(
            serde_json::to_string(&Recurrence::Monthly).unwrap(),
            "\"monthly\""
        );
    }
}
