use chrono::{DateTime, SecondsFormat, Utc};
use kokoro_core::types::{Priority, Recurrence, ReminderId, ReminderStatus, UserId};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: ReminderId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub priority: Priority,
    pub status: ReminderStatus,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub priority: Priority,
    pub email: String,
}

/// Owner edit. Absent fields are left alone; `description: null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub priority: Option<Priority>,
    pub email: Option<String>,
}

impl ReminderPatch {
    pub fn is_empty(&self) -> bool {
        self == &ReminderPatch::default()
    }
}

fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Listing query for one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderFilter {
    /// `None` lists every status.
    pub status: Option<ReminderStatus>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ReminderFilter {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ReminderFilter {
    /// Clamp to `page >= 1` and `1 <= limit <= 100`.
    pub fn normalized(self) -> Self {
        Self {
            status: self.status,
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, filter: &ReminderFilter) -> Self {
        let limit = u64::from(filter.limit.max(1));
        Self {
            items,
            total,
            page: filter.page,
            limit: filter.limit,
            pages: total.div_ceil(limit),
        }
    }
}

/// Queue payload: the snapshot a worker needs to deliver a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderJob {
    pub reminder_id: ReminderId,
    pub user_id: UserId,
    pub email: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: Priority,
    pub scheduled_at: DateTime<Utc>,
    pub recurrence: Recurrence,
}

impl From<&Reminder> for ReminderJob {
    fn from(r: &Reminder) -> Self {
        Self {
            reminder_id: r.id.clone(),
            user_id: r.user_id.clone(),
            email: r.email.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            priority: r.priority,
            scheduled_at: r.scheduled_at,
            recurrence: r.recurrence,
        }
    }
}

/// Instants are kept at millisecond precision, the precision they are stored at.
pub fn to_millis_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Storage form: RFC 3339, UTC, fixed millisecond digits so text order is time order.
pub fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
