use rusqlite::Connection;

use crate::error::Result;

/// Initialise the reminders schema in `conn`.
///
/// Instants are RFC 3339 UTC text with millisecond digits, so `ORDER BY` and
/// range comparisons on them are chronological.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id           TEXT NOT NULL PRIMARY KEY,
            user_id      TEXT NOT NULL,
            title        TEXT NOT NULL,
            description  TEXT,
            scheduled_at TEXT NOT NULL,
            recurrence   TEXT NOT NULL DEFAULT 'none',
            priority     TEXT NOT NULL DEFAULT 'medium',
            status       TEXT NOT NULL DEFAULT 'pending',
            email        TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        ) STRICT;

        -- Owner listing, sorted by schedule.
        CREATE INDEX IF NOT EXISTS idx_reminders_user_scheduled
            ON reminders (user_id, scheduled_at);

        -- Reconciler sweep: status = 'pending' AND scheduled_at <= now.
        CREATE INDEX IF NOT EXISTS idx_reminders_status_scheduled
            ON reminders (status, scheduled_at);
        ",
    )?;
    Ok(())
}
