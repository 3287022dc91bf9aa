use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use kokoro_core::types::{ReminderId, ReminderStatus, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::{ReminderError, Result};
use crate::model::{format_instant, Page, Reminder, ReminderFilter};

/// Durable record store for reminders.
pub trait ReminderStore: Send + Sync {
    fn insert(&self, reminder: &Reminder) -> Result<()>;

    fn get(&self, id: &ReminderId) -> Result<Option<Reminder>>;

    fn get_owned(&self, id: &ReminderId, owner: &UserId) -> Result<Option<Reminder>>;

    /// One page of `owner`'s reminders, ordered by `scheduled_at`.
    fn list_owned(&self, owner: &UserId, filter: &ReminderFilter) -> Result<Page<Reminder>>;

    /// Persist the editable fields and `updated_at`. Status is untouched.
    fn update(&self, reminder: &Reminder) -> Result<()>;

    /// Compare-and-set on status. Returns `false` if the record was not in `from`.
    fn transition(
        &self,
        id: &ReminderId,
        from: ReminderStatus,
        to: ReminderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    fn delete_owned(&self, id: &ReminderId, owner: &UserId) -> Result<bool>;

    /// Pending reminders due at `now`, oldest first, at most `limit`.
    fn find_due_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>>;
}

const REMINDER_COLUMNS: &str = "id, user_id, title, description, scheduled_at, recurrence,
     priority, status, email, created_at, updated_at";

/// SQLite implementation over a single `Mutex<Connection>`.
pub struct SqliteReminderStore {
    db: Mutex<Connection>,
}

impl SqliteReminderStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ReminderError::Internal(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| ReminderError::Internal("record store lock poisoned".into()))
    }
}

impl ReminderStore for SqliteReminderStore {
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    fn insert(&self, reminder: &Reminder) -> Result<()> {
        self.db()?.execute(
            "INSERT INTO reminders
             (id, user_id, title, description, scheduled_at, recurrence,
              priority, status, email, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                reminder.id.as_str(),
                reminder.user_id.as_str(),
                reminder.title,
                reminder.description,
                format_instant(reminder.scheduled_at),
                reminder.recurrence.as_str(),
                reminder.priority.as_str(),
                reminder.status.as_str(),
                reminder.email,
                format_instant(reminder.created_at),
                format_instant(reminder.updated_at),
            ],
        )?;
        debug!("reminder inserted");
        Ok(())
    }

    fn get(&self, id: &ReminderId) -> Result<Option<Reminder>> {
        let db = self.db()?;
        let reminder = db
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                [id.as_str()],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }

    fn get_owned(&self, id: &ReminderId, owner: &UserId) -> Result<Option<Reminder>> {
        let db = self.db()?;
        let reminder = db
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1 AND user_id = ?2"),
                [id.as_str(), owner.as_str()],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }

    #[instrument(skip(self, filter), fields(user_id = %owner))]
    fn list_owned(&self, owner: &UserId, filter: &ReminderFilter) -> Result<Page<Reminder>> {
        let filter = filter.normalized();
        let status = filter.status.map(|s| s.as_str());
        let db = self.db()?;

        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM reminders WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)",
            params![owner.as_str(), status],
            |r| r.get(0),
        )?;

        let mut stmt = db.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY scheduled_at ASC, id ASC
             LIMIT ?3 OFFSET ?4"
        ))?;
        let items = stmt
            .query_map(
                params![
                    owner.as_str(),
                    status,
                    filter.limit,
                    i64::try_from(filter.offset()).unwrap_or(i64::MAX)
                ],
                row_to_reminder,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page::new(items, total as u64, &filter))
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    fn update(&self, reminder: &Reminder) -> Result<()> {
        let n = self.db()?.execute(
            "UPDATE reminders
             SET title = ?2, description = ?3, scheduled_at = ?4, recurrence = ?5,
                 priority = ?6, email = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                reminder.id.as_str(),
                reminder.title,
                reminder.description,
                format_instant(reminder.scheduled_at),
                reminder.recurrence.as_str(),
                reminder.priority.as_str(),
                reminder.email,
                format_instant(reminder.updated_at),
            ],
        )?;
        if n == 0 {
            return Err(ReminderError::NotFound {
                id: reminder.id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    fn transition(
        &self,
        id: &ReminderId,
        from: ReminderStatus,
        to: ReminderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self.db()?.execute(
            "UPDATE reminders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id.as_str(), from.as_str(), to.as_str(), format_instant(at)],
        )?;
        Ok(n > 0)
    }

    #[instrument(skip(self), fields(reminder_id = %id))]
    fn delete_owned(&self, id: &ReminderId, owner: &UserId) -> Result<bool> {
        let n = self.db()?.execute(
            "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
            [id.as_str(), owner.as_str()],
        )?;
        Ok(n > 0)
    }

    fn find_due_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reminder>> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE status = 'pending' AND scheduled_at <= ?1
             ORDER BY scheduled_at ASC
             LIMIT ?2"
        ))?;
        let due = stmt
            .query_map(
                params![format_instant(now), i64::try_from(limit).unwrap_or(i64::MAX)],
                row_to_reminder,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(due)
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_instant(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: ReminderId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        scheduled_at: parse_instant(row, 4)?,
        recurrence: parse_column(row, 5)?,
        priority: parse_column(row, 6)?,
        status: parse_column(row, 7)?,
        email: row.get(8)?,
        created_at: parse_instant(row, 9)?,
        updated_at: parse_instant(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use kokoro_core::types::{Priority, Recurrence};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn reminder(owner: &str, title: &str, at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: ReminderId::new(),
            user_id: owner.into(),
            title: title.into(),
            description: Some("details".into()),
            scheduled_at: at,
            recurrence: Recurrence::None,
            priority: Priority::Medium,
            status: ReminderStatus::Pending,
            email: format!("{owner}@example.com"),
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        let r = reminder("u1", "Dentist", t0() + Duration::days(2));
        store.insert(&r).unwrap();

        assert_eq!(store.get(&r.id).unwrap(), Some(r.clone()));
        assert_eq!(store.get_owned(&r.id, &"u1".into()).unwrap(), Some(r.clone()));
        assert_eq!(store.get_owned(&r.id, &"u2".into()).unwrap(), None);
        assert_eq!(store.get(&ReminderId::from("missing")).unwrap(), None);
    }

    #[test]
    fn listing_is_scoped_sorted_and_paginated() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        for (i, title) in ["c", "a", "b"].iter().enumerate() {
            let at = t0() + Duration::hours([3, 1, 2][i]);
            store.insert(&reminder("u1", title, at)).unwrap();
        }
        store.insert(&reminder("u2", "other", t0())).unwrap();

        let page = store
            .list_owned(
                &"u1".into(),
                &ReminderFilter {
                    status: None,
                    page: 1,
                    limit: 2,
                },
            )
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        let titles: Vec<_> = page.items.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);

        let page2 = store
            .list_owned(
                &"u1".into(),
                &ReminderFilter {
                    status: None,
                    page: 2,
                    limit: 2,
                },
            )
            .unwrap();
        assert_eq!(page2.items.len(), 1);
        assert_eq!(page2.items[0].title, "c");
    }

    #[test]
    fn status_filter_and_transition() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        let r = reminder("u1", "x", t0());
        store.insert(&r).unwrap();

        assert!(store
            .transition(&r.id, ReminderStatus::Pending, ReminderStatus::Sent, t0())
            .unwrap());
        assert!(!store
            .transition(&r.id, ReminderStatus::Pending, ReminderStatus::Cancelled, t0())
            .unwrap());

        let sent = store
            .list_owned(
                &"u1".into(),
                &ReminderFilter {
                    status: Some(ReminderStatus::Sent),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(sent.total, 1);
        let pending = store
            .list_owned(
                &"u1".into(),
                &ReminderFilter {
                    status: Some(ReminderStatus::Pending),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(pending.total, 0);
    }

    #[test]
    fn due_pending_respects_time_status_and_limit() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        let due_a = reminder("u1", "due-a", t0() - Duration::minutes(10));
        let due_b = reminder("u1", "due-b", t0());
        let future = reminder("u1", "future", t0() + Duration::minutes(1));
        let sent = reminder("u1", "sent", t0() - Duration::hours(1));
        for r in [&due_a, &due_b, &future, &sent] {
            store.insert(r).unwrap();
        }
        store
            .transition(&sent.id, ReminderStatus::Pending, ReminderStatus::Sent, t0())
            .unwrap();

        let due = store.find_due_pending(t0(), 100).unwrap();
        let titles: Vec<_> = due.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["due-a", "due-b"]);
        assert_eq!(store.find_due_pending(t0(), 1).unwrap().len(), 1);
    }

    #[test]
    fn update_and_delete_are_owner_scoped() {
        let store = SqliteReminderStore::open_in_memory().unwrap();
        let mut r = reminder("u1", "old", t0());
        store.insert(&r).unwrap();

        r.title = "new".into();
        r.description = None;
        r.updated_at = t0() + Duration::minutes(5);
        store.update(&r).unwrap();
        assert_eq!(store.get(&r.id).unwrap().unwrap().title, "new");

        assert!(!store.delete_owned(&r.id, &"u2".into()).unwrap());
        assert!(store.delete_owned(&r.id, &"u1".into()).unwrap());
        assert!(store.get(&r.id).unwrap().is_none());

        let ghost = reminder("u1", "ghost", t0());
        assert!(matches!(
            store.update(&ghost),
            Err(ReminderError::NotFound { .. })
        ));
    }

    #[test]
    fn records_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kokoro.db").to_string_lossy().to_string();
        let r = reminder("u1", "persist", t0());
        {
            let store = SqliteReminderStore::open(&path).unwrap();
            store.insert(&r).unwrap();
        }
        let store = SqliteReminderStore::open(&path).unwrap();
        assert_eq!(store.get(&r.id).unwrap(), Some(r));
    }
}
