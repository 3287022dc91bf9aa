use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    backoff::backoff_delay,
    db::{init_db, PRAGMAS},
    error::{QueueError, Result},
    types::{
        ClaimOutcome, FailOutcome, Job, JobHandle, JobState, NewJob, PruneReport, QueueOptions,
        QueueStats, RateLimit, StallOutcome, StalledJob, StoreHealth,
    },
};

const JOB_COLUMNS: &str = "id, queue, job_key, name, payload, priority, state, run_at,
     attempts_made, max_attempts, stalled_count, locked_by, last_error, created_at, finished_at";

/// A pending row waits while another row with its key is executing.
const KEY_NOT_ACTIVE: &str = "NOT EXISTS (SELECT 1 FROM queue_jobs a
     WHERE a.queue = q.queue AND a.job_key = q.job_key AND a.state = 'active')";

const STALL_LIMIT_ERROR: &str = "job stalled more than allowable limit";

/// Producer-side contract of the queue: what the lifecycle layer needs.
///
/// Kept narrow so callers can be tested against a fake without SQLite.
pub trait JobQueue: Send + Sync {
    /// Insert `job`, replacing any pending job with the same key.
    fn enqueue(&self, job: NewJob) -> Result<JobHandle>;

    /// Insert `job` unless a pending or active job already holds its key.
    fn enqueue_if_absent(&self, job: NewJob) -> Result<Option<JobHandle>>;

    /// Remove the pending job for `key`. Returns `false` when there was none.
    /// A job that is already executing is left alone.
    fn cancel(&self, key: &str) -> Result<bool>;

    fn stats(&self) -> Result<QueueStats>;
}

/// SQLite-backed job store for a single named queue.
///
/// Every method that depends on the clock has an `_at` variant taking `now`
/// explicitly; the [`JobQueue`] impl and the worker pass `Utc::now()`.
pub struct JobStore {
    conn: Mutex<Connection>,
    options: QueueOptions,
    path: String,
    wakeup: Arc<Notify>,
}

impl JobStore {
    /// Open (or create) the store at `path`, creating parent directories.
    pub fn open(path: &str, options: QueueOptions) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QueueError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        Self::from_connection(conn, path, options)
    }

    pub fn open_in_memory(options: QueueOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, ":memory:", options)
    }

    fn from_connection(conn: Connection, path: &str, options: QueueOptions) -> Result<Self> {
        init_db(&conn)?;
        info!(queue = %options.name, %path, "job store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            options,
            path: path.to_string(),
            wakeup: Arc::new(Notify::new()),
        })
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Signalled whenever a job becomes pending in this process.
    pub fn wakeup(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }

    /// Close the underlying connection, flushing the WAL.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| QueueError::Unavailable("connection lock poisoned".into()))?;
        conn.close().map_err(|(_, e)| QueueError::from(e))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Unavailable("connection lock poisoned".into()))
    }

    // ── Producer side ────────────────────────────────────────────────────────

    #[instrument(skip(self, job), fields(queue = %self.options.name, key = %job.key))]
    pub fn enqueue_at(&self, job: NewJob, now: DateTime<Utc>) -> Result<JobHandle> {
        let payload = serde_json::to_string(&job.payload)?;
        let (id, run_at_ms, replaced) = {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute(
                "DELETE FROM queue_jobs WHERE queue = ?1 AND job_key = ?2 AND state = 'pending'",
                params![self.options.name, job.key],
            )?;
            let (id, run_at_ms) = self.insert_pending(&tx, &job, &payload, now)?;
            tx.commit()?;
            (id, run_at_ms, removed > 0)
        };

        self.wakeup.notify_one();
        info!(job_id = %id, run_at_ms, replaced, "job enqueued");

        Ok(JobHandle {
            id,
            key: job.key,
            run_at: from_millis(run_at_ms),
            replaced,
        })
    }

    /// Insert `job` only when no pending or active job holds its key.
    ///
    /// A job waiting out its backoff keeps its attempt count and run time, and
    /// a job being executed is not doubled. Returns `None` when skipped.
    #[instrument(skip(self, job), fields(queue = %self.options.name, key = %job.key))]
    pub fn enqueue_if_absent_at(
        &self,
        job: NewJob,
        now: DateTime<Utc>,
    ) -> Result<Option<JobHandle>> {
        let payload = serde_json::to_string(&job.payload)?;
        let inserted = {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let live: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM queue_jobs
                 WHERE queue = ?1 AND job_key = ?2 AND state IN ('pending', 'active'))",
                params![self.options.name, job.key],
                |r| r.get(0),
            )?;
            if live {
                None
            } else {
                let inserted = self.insert_pending(&tx, &job, &payload, now)?;
                tx.commit()?;
                Some(inserted)
            }
        };

        let Some((id, run_at_ms)) = inserted else {
            debug!("job already live for key, left alone");
            return Ok(None);
        };
        self.wakeup.notify_one();
        info!(job_id = %id, run_at_ms, "job enqueued");
        Ok(Some(JobHandle {
            id,
            key: job.key,
            run_at: from_millis(run_at_ms),
            replaced: false,
        }))
    }

    fn insert_pending(
        &self,
        conn: &Connection,
        job: &NewJob,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, i64)> {
        let now_ms = now.timestamp_millis();
        let run_at_ms = now_ms.saturating_add(duration_ms(job.delay));
        let id = Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO queue_jobs
             (id, queue, job_key, name, payload, priority, state, run_at,
              attempts_made, max_attempts, backoff_ms, stalled_count, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,'pending',?7,0,?8,?9,0,?10)",
            params![
                id,
                self.options.name,
                job.key,
                job.name,
                payload,
                job.priority,
                run_at_ms,
                self.options.attempts,
                duration_ms(self.options.backoff),
                now_ms,
            ],
        )?;
        Ok((id, run_at_ms))
    }

    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub fn remove_pending(&self, key: &str) -> Result<bool> {
        let n = self.conn()?.execute(
            "DELETE FROM queue_jobs WHERE queue = ?1 AND job_key = ?2 AND state = 'pending'",
            params![self.options.name, key],
        )?;
        if n > 0 {
            info!(%key, "pending job removed");
        } else {
            debug!(%key, "no pending job to remove");
        }
        Ok(n > 0)
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT
                COALESCE(SUM(state = 'pending' AND run_at <= ?2), 0),
                COALESCE(SUM(state = 'active'), 0),
                COALESCE(SUM(state = 'completed'), 0),
                COALESCE(SUM(state = 'failed'), 0),
                COALESCE(SUM(state = 'pending' AND run_at > ?2), 0)
             FROM queue_jobs WHERE queue = ?1",
            params![self.options.name, now.timestamp_millis()],
            |r| {
                Ok(QueueStats {
                    waiting: r.get::<_, i64>(0)? as u64,
                    active: r.get::<_, i64>(1)? as u64,
                    completed: r.get::<_, i64>(2)? as u64,
                    failed: r.get::<_, i64>(3)? as u64,
                    delayed: r.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM queue_jobs WHERE id = ?1"),
                [id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// The pending job for `key`, if any.
    pub fn pending_for_key(&self, key: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM queue_jobs
                     WHERE queue = ?1 AND job_key = ?2 AND state = 'pending'"
                ),
                params![self.options.name, key],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Every job row for `key`, oldest first.
    pub fn jobs_for_key(&self, key: &str) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM queue_jobs
             WHERE queue = ?1 AND job_key = ?2 ORDER BY created_at, id"
        ))?;
        let jobs = stmt
            .query_map(params![self.options.name, key], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    // ── Worker side ──────────────────────────────────────────────────────────

    /// Lease the next due job to `worker_id`.
    ///
    /// Due jobs are served by `run_at`, then by priority rank. A key that is
    /// already leased is skipped until its holder finishes. When `rate` is
    /// set, the claim also consumes a slot of the shared fixed window.
    pub fn claim_next(
        &self,
        worker_id: &str,
        lease: Duration,
        rate: Option<RateLimit>,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let now_ms = now.timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let due: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT id FROM queue_jobs q
                     WHERE queue = ?1 AND state = 'pending' AND run_at <= ?2 AND {KEY_NOT_ACTIVE}
                     ORDER BY run_at, priority, created_at
                     LIMIT 1"
                ),
                params![self.options.name, now_ms],
                |r| r.get(0),
            )
            .optional()?;

        let Some(id) = due else {
            let next: Option<i64> = tx.query_row(
                &format!(
                    "SELECT MIN(run_at) FROM queue_jobs q
                     WHERE queue = ?1 AND state = 'pending' AND {KEY_NOT_ACTIVE}"
                ),
                [&self.options.name],
                |r| r.get(0),
            )?;
            return Ok(ClaimOutcome::Idle {
                next_run_at: next.map(from_millis),
            });
        };

        if let Some(limit) = rate {
            let window_ms = duration_ms(limit.window).max(1);
            let window_start = now_ms - now_ms.rem_euclid(window_ms);
            let current: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT window_start, count FROM queue_rate_windows WHERE queue = ?1",
                    [&self.options.name],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let used = match current {
                Some((start, count)) if start == window_start => count,
                _ => 0,
            };
            if used >= i64::from(limit.max) {
                let wait = (window_start + window_ms - now_ms).max(1);
                return Ok(ClaimOutcome::RateLimited {
                    retry_after: Duration::from_millis(wait as u64),
                });
            }
            tx.execute(
                "INSERT INTO queue_rate_windows (queue, window_start, count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(queue) DO UPDATE
                 SET window_start = excluded.window_start, count = excluded.count",
                params![self.options.name, window_start, used + 1],
            )?;
        }

        tx.execute(
            "UPDATE queue_jobs SET state = 'active', locked_by = ?2, lock_expires_at = ?3
             WHERE id = ?1",
            params![id, worker_id, now_ms.saturating_add(duration_ms(lease))],
        )?;
        let job = tx.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM queue_jobs WHERE id = ?1"),
            [&id],
            row_to_job,
        )?;
        tx.commit()?;

        debug!(job_id = %job.id, key = %job.key, attempt = job.attempt(), %worker_id, "job claimed");
        Ok(ClaimOutcome::Claimed(job))
    }

    /// Extend the lease held by `worker_id`.
    pub fn heartbeat(
        &self,
        id: &str,
        worker_id: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let n = self.conn()?.execute(
            "UPDATE queue_jobs SET lock_expires_at = ?3
             WHERE id = ?1 AND state = 'active' AND locked_by = ?2",
            params![
                id,
                worker_id,
                now.timestamp_millis().saturating_add(duration_ms(lease))
            ],
        )?;
        if n == 0 {
            return Err(QueueError::LeaseLost { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub fn complete(&self, id: &str, worker_id: &str, now: DateTime<Utc>) -> Result<()> {
        let n = self.conn()?.execute(
            "UPDATE queue_jobs
             SET state = 'completed', finished_at = ?3, locked_by = NULL, lock_expires_at = NULL
             WHERE id = ?1 AND state = 'active' AND locked_by = ?2",
            params![id, worker_id, now.timestamp_millis()],
        )?;
        if n == 0 {
            return Err(QueueError::LeaseLost { id: id.to_string() });
        }
        // A newer row for the same key may have been waiting on this lease.
        self.wakeup.notify_one();
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable errors go back to pending after the backoff delay until the
    /// attempt budget is spent; permanent errors fail the job at once.
    #[instrument(skip(self, error), fields(queue = %self.options.name))]
    pub fn fail(
        &self,
        id: &str,
        worker_id: &str,
        error: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome> {
        let now_ms = now.timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, u32, u32, i64)> = tx
            .query_row(
                "SELECT job_key, attempts_made, max_attempts, backoff_ms FROM queue_jobs
                 WHERE id = ?1 AND state = 'active' AND locked_by = ?2",
                params![id, worker_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((key, attempts_made, max_attempts, backoff_ms)) = row else {
            return Err(QueueError::LeaseLost { id: id.to_string() });
        };
        let attempts = attempts_made + 1;

        let outcome = if retryable && attempts < max_attempts {
            if has_pending(&tx, &self.options.name, &key)? {
                finish_failed(&tx, id, attempts, &format!("superseded: {error}"), now_ms)?;
                FailOutcome::Superseded
            } else {
                let delay = backoff_delay(Duration::from_millis(backoff_ms.max(0) as u64), attempts);
                tx.execute(
                    "UPDATE queue_jobs
                     SET state = 'pending', attempts_made = ?2, last_error = ?3, run_at = ?4,
                         locked_by = NULL, lock_expires_at = NULL
                     WHERE id = ?1",
                    params![id, attempts, error, now_ms.saturating_add(duration_ms(delay))],
                )?;
                FailOutcome::Retrying {
                    attempt: attempts,
                    delay,
                }
            }
        } else {
            finish_failed(&tx, id, attempts, error, now_ms)?;
            FailOutcome::Exhausted { attempts }
        };
        tx.commit()?;

        self.wakeup.notify_one();
        Ok(outcome)
    }

    /// Find active jobs whose lease ran out and make them eligible again, or
    /// fail them once they stalled more than `max_stalled` times.
    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub fn recover_stalled(&self, max_stalled: u32, now: DateTime<Utc>) -> Result<Vec<StalledJob>> {
        let now_ms = now.timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let expired = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM queue_jobs
                 WHERE queue = ?1 AND state = 'active' AND lock_expires_at < ?2
                 ORDER BY run_at"
            ))?;
            let rows = stmt
                .query_map(params![self.options.name, now_ms], row_to_job)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut recovered = Vec::with_capacity(expired.len());
        for mut job in expired {
            job.stalled_count += 1;
            let outcome = if has_pending(&tx, &self.options.name, &job.key)? {
                StallOutcome::Superseded
            } else if job.stalled_count > max_stalled {
                StallOutcome::Failed
            } else {
                StallOutcome::Requeued
            };

            match outcome {
                StallOutcome::Requeued => {
                    tx.execute(
                        "UPDATE queue_jobs
                         SET state = 'pending', stalled_count = ?2, run_at = ?3,
                             locked_by = NULL, lock_expires_at = NULL
                         WHERE id = ?1",
                        params![job.id, job.stalled_count, now_ms],
                    )?;
                    job.state = JobState::Pending;
                }
                StallOutcome::Failed | StallOutcome::Superseded => {
                    let reason = if outcome == StallOutcome::Failed {
                        STALL_LIMIT_ERROR
                    } else {
                        "stalled; superseded by a newer job"
                    };
                    tx.execute(
                        "UPDATE queue_jobs
                         SET state = 'failed', stalled_count = ?2, last_error = ?3,
                             finished_at = ?4, locked_by = NULL, lock_expires_at = NULL
                         WHERE id = ?1",
                        params![job.id, job.stalled_count, reason, now_ms],
                    )?;
                    job.state = JobState::Failed;
                    job.last_error = Some(reason.to_string());
                }
            }
            warn!(job_id = %job.id, key = %job.key, stalled_count = job.stalled_count, ?outcome, "stalled job recovered");
            job.locked_by = None;
            recovered.push(StalledJob { job, outcome });
        }
        tx.commit()?;

        if recovered.iter().any(|s| s.outcome == StallOutcome::Requeued) {
            self.wakeup.notify_one();
        }
        Ok(recovered)
    }

    /// Apply the retention policy to finished jobs.
    #[instrument(skip(self), fields(queue = %self.options.name))]
    pub fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport> {
        let retention = self.options.retention;
        let now_ms = now.timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let report = PruneReport {
            completed: prune_state(
                &tx,
                &self.options.name,
                JobState::Completed,
                now_ms - duration_ms(retention.completed_max_age),
                retention.completed_max_count,
            )?,
            failed: prune_state(
                &tx,
                &self.options.name,
                JobState::Failed,
                now_ms - duration_ms(retention.failed_max_age),
                retention.failed_max_count,
            )?,
        };
        tx.commit()?;
        if report.completed + report.failed > 0 {
            debug!(completed = report.completed, failed = report.failed, "finished jobs pruned");
        }
        Ok(report)
    }

    /// Probe the store and report connection details.
    pub fn ping(&self) -> StoreHealth {
        let started = Instant::now();
        let probe = || -> Result<(String, String, i64, i64)> {
            let conn = self.conn()?;
            let version: String = conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
            let journal: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
            let pages: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
            let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
            Ok((version, journal, pages, page_size))
        };

        match probe() {
            Ok((version, journal, pages, page_size)) => StoreHealth {
                connected: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
                version: Some(version),
                journal_mode: Some(journal),
                page_count: Some(pages),
                page_size: Some(page_size),
                path: self.path.clone(),
            },
            Err(e) => StoreHealth {
                connected: false,
                latency_ms: None,
                error: Some(e.to_string()),
                version: None,
                journal_mode: None,
                page_count: None,
                page_size: None,
                path: self.path.clone(),
            },
        }
    }
}

impl JobQueue for JobStore {
    fn enqueue(&self, job: NewJob) -> Result<JobHandle> {
        self.enqueue_at(job, Utc::now())
    }

    fn enqueue_if_absent(&self, job: NewJob) -> Result<Option<JobHandle>> {
        self.enqueue_if_absent_at(job, Utc::now())
    }

    fn cancel(&self, key: &str) -> Result<bool> {
        self.remove_pending(key)
    }

    fn stats(&self) -> Result<QueueStats> {
        self.stats_at(Utc::now())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn has_pending(conn: &Connection, queue: &str, key: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM queue_jobs
         WHERE queue = ?1 AND job_key = ?2 AND state = 'pending')",
        params![queue, key],
        |r| r.get(0),
    )?;
    Ok(exists)
}

fn finish_failed(conn: &Connection, id: &str, attempts: u32, error: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE queue_jobs
         SET state = 'failed', attempts_made = ?2, last_error = ?3, finished_at = ?4,
             locked_by = NULL, lock_expires_at = NULL
         WHERE id = ?1",
        params![id, attempts, error, now_ms],
    )?;
    Ok(())
}

fn prune_state(
    conn: &Connection,
    queue: &str,
    state: JobState,
    cutoff_ms: i64,
    keep: u64,
) -> Result<usize> {
    let by_age = conn.execute(
        "DELETE FROM queue_jobs WHERE queue = ?1 AND state = ?2 AND finished_at < ?3",
        params![queue, state.as_str(), cutoff_ms],
    )?;
    let by_count = conn.execute(
        "DELETE FROM queue_jobs
         WHERE queue = ?1 AND state = ?2 AND id NOT IN (
             SELECT id FROM queue_jobs WHERE queue = ?1 AND state = ?2
             ORDER BY finished_at DESC, id DESC LIMIT ?3
         )",
        params![queue, state.as_str(), i64::try_from(keep).unwrap_or(i64::MAX)],
    )?;
    Ok(by_age + by_count)
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let payload: String = row.get(4)?;
    let state: String = row.get(6)?;
    Ok(Job {
        id: row.get(0)?,
        queue: row.get(1)?,
        key: row.get(2)?,
        name: row.get(3)?,
        payload: serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        priority: row.get(5)?,
        state: state.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
        })?,
        run_at: from_millis(row.get(7)?),
        attempts_made: row.get(8)?,
        max_attempts: row.get(9)?,
        stalled_count: row.get(10)?,
        locked_by: row.get(11)?,
        last_error: row.get(12)?,
        created_at: from_millis(row.get(13)?),
        finished_at: row.get::<_, Option<i64>>(14)?.map(from_millis),
    })
}
