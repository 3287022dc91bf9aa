use rusqlite::Connection;

use crate::error::Result;

/// Connection pragmas applied to every queue connection.
pub const PRAGMAS: &str =
    "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;";

/// Initialise the queue schema in `conn`.
///
/// All instants are Unix milliseconds. The partial unique index is what keeps
/// a key down to a single pending job; finished rows with the same key are
/// allowed to pile up until retention removes them.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queue_jobs (
            id              TEXT    NOT NULL PRIMARY KEY,
            queue           TEXT    NOT NULL,
            job_key         TEXT    NOT NULL,
            name            TEXT    NOT NULL,
            payload         TEXT    NOT NULL,   -- opaque JSON
            priority        INTEGER NOT NULL,   -- 1 is served first
            state           TEXT    NOT NULL DEFAULT 'pending',
            run_at          INTEGER NOT NULL,
            attempts_made   INTEGER NOT NULL DEFAULT 0,
            max_attempts    INTEGER NOT NULL,
            backoff_ms      INTEGER NOT NULL,
            stalled_count   INTEGER NOT NULL DEFAULT 0,
            locked_by       TEXT,
            lock_expires_at INTEGER,
            last_error      TEXT,
            created_at      INTEGER NOT NULL,
            finished_at     INTEGER
        ) STRICT;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_jobs_pending_key
            ON queue_jobs (queue, job_key) WHERE state = 'pending';

        -- Claim query: WHERE queue = ? AND state = 'pending' AND run_at <= ?
        --              ORDER BY run_at, priority
        CREATE INDEX IF NOT EXISTS idx_queue_jobs_due
            ON queue_jobs (queue, state, run_at, priority);

        CREATE INDEX IF NOT EXISTS idx_queue_jobs_lock
            ON queue_jobs (queue, state, lock_expires_at);

        -- Fixed-window activation counter shared by every worker process.
        CREATE TABLE IF NOT EXISTS queue_rate_windows (
            queue        TEXT    NOT NULL PRIMARY KEY,
            window_start INTEGER NOT NULL,
            count        INTEGER NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'queue_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn second_pending_row_for_a_key_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let insert = "INSERT INTO queue_jobs
            (id, queue, job_key, name, payload, priority, state, run_at, max_attempts, backoff_ms, created_at)
            VALUES (?1, 'q', 'k', 'n', '{}', 3, ?2, 0, 3, 10, 0)";
        conn.execute(insert, ["a", "pending"]).unwrap();
        conn.execute(insert, ["b", "completed"]).unwrap();
        assert!(conn.execute(insert, ["c", "pending"]).is_err());
    }
}
