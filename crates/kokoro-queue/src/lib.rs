//! `kokoro-queue`: durable delayed job queue on SQLite.
//!
//! # Overview
//!
//! Every job carries a caller-chosen `key`. At most one *pending* job exists
//! per key: enqueueing the same key again replaces the pending entry in a
//! single transaction. Workers claim due jobs with a time-boxed lease, renew
//! it while they run, and report the outcome. Leases that expire mark the
//! job as stalled so another worker can pick it up.
//!
//! # Job states
//!
//! | State       | Meaning                                              |
//! |-------------|------------------------------------------------------|
//! | `pending`   | Waiting for `run_at` (delayed) or due (waiting)      |
//! | `active`    | Leased by a worker                                   |
//! | `completed` | Handler succeeded; kept until retention prunes it    |
//! | `failed`    | Attempts exhausted or permanent error                |
//!
//! The store file is independent from any record database, so the queue can
//! be shared by several worker processes.

pub mod backoff;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{QueueError, Result};
pub use store::{JobQueue, JobStore};
pub use types::{
    ClaimOutcome, FailOutcome, Job, JobHandle, JobState, NewJob, PruneReport, QueueOptions,
    QueueStats, RateLimit, RetentionPolicy, StallOutcome, StalledJob, StoreHealth,
};
