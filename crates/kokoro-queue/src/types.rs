use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job to be enqueued. `key` is the dedup identity; `priority` is a rank
/// where 1 is served first.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub key: String,
    pub name: String,
    pub payload: serde_json::Value,
    /// Zero means due immediately.
    pub delay: Duration,
    pub priority: u32,
}

/// Returned by enqueue. `replaced` is true when a pending job with the same
/// key was dropped in favour of this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: String,
    pub key: String,
    pub run_at: DateTime<Utc>,
    pub replaced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A persisted job row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub key: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: u32,
    pub state: JobState,
    pub run_at: DateTime<Utc>,
    /// Failed attempts so far. The running attempt is `attempts_made + 1`.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub stalled_count: u32,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// 1-based number of the attempt currently (or next) running.
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }
}

/// Point-in-time counts. `waiting` are due, `delayed` are pending in the future.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

/// Global activation ceiling: at most `max` claims per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Job),
    /// Nothing due. `next_run_at` is the earliest pending instant, if any.
    Idle { next_run_at: Option<DateTime<Utc>> },
    /// A job is due but the rate window is full.
    RateLimited { retry_after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back to pending; runs again after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Moved to the terminal failed state.
    Exhausted { attempts: u32 },
    /// A newer pending job for the same key exists, so this one was closed
    /// without retry. The newer job carries the work forward.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallOutcome {
    Requeued,
    Failed,
    Superseded,
}

#[derive(Debug, Clone)]
pub struct StalledJob {
    pub job: Job,
    pub outcome: StallOutcome,
}

/// How long finished jobs are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub completed_max_age: Duration,
    pub completed_max_count: u64,
    pub failed_max_age: Duration,
    pub failed_max_count: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::from_secs(24 * 3600),
            completed_max_count: 1000,
            failed_max_age: Duration::from_secs(7 * 24 * 3600),
            failed_max_count: 10_000,
        }
    }
}

/// Per-queue settings applied to every job enqueued through a [`crate::JobStore`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub name: String,
    pub attempts: u32,
    pub backoff: Duration,
    pub retention: RetentionPolicy,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: 3,
            backoff: Duration::from_secs(60),
            retention: RetentionPolicy::default(),
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub completed: usize,
    pub failed: usize,
}

/// Result of a store health probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub version: Option<String>,
    pub journal_mode: Option<String>,
    pub page_count: Option<i64>,
    pub page_size: Option<i64>,
    pub path: String,
}
