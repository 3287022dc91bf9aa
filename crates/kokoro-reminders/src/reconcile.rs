use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Result;
use crate::lifecycle::ReminderService;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub queued: usize,
}

/// Sweeps the record store for reminders that are due and still pending and
/// puts them back on the queue.
///
/// A reminder whose job is still pending (late, or waiting out a retry) or
/// running is left alone, so the sweep neither resets retry history nor
/// starts a second delivery. It never changes a reminder's status.
pub struct Reconciler {
    service: Arc<ReminderService>,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(service: Arc<ReminderService>, batch_size: usize) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn run_once(&self) -> Result<ReconcileReport> {
        self.run_at(Utc::now())
    }

    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let due = self.service.store().find_due_pending(now, self.batch_size)?;
        let mut queued = 0;
        for reminder in &due {
            if self.service.ensure_scheduled_at(reminder, now)?.is_some() {
                queued += 1;
            }
        }
        let report = ReconcileReport { queued };
        if report.queued > 0 {
            info!(queued = report.queued, "re-queued due reminders");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reminder;
    use crate::store::{ReminderStore, SqliteReminderStore};
    use chrono::Duration;
    use kokoro_core::types::{Priority, Recurrence, ReminderId, ReminderStatus};
    use kokoro_notify::LogNotifier;
    use kokoro_queue::{ClaimOutcome, JobQueue, JobStore, QueueOptions};

    fn reminder(at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: ReminderId::new(),
            user_id: "u1".into(),
            title: "Backup".into(),
            description: None,
            scheduled_at: at,
            recurrence: Recurrence::None,
            priority: Priority::Medium,
            status: ReminderStatus::Pending,
            email: "u1@example.com".into(),
            created_at: at,
            updated_at: at,
        }
    }

    fn setup() -> (Arc<SqliteReminderStore>, Arc<JobStore>, Arc<ReminderService>) {
        let store = Arc::new(SqliteReminderStore::open_in_memory().unwrap());
        let queue = Arc::new(JobStore::open_in_memory(QueueOptions::new("test")).unwrap());
        let service = Arc::new(ReminderService::new(
            store.clone(),
            queue.clone(),
            Arc::new(LogNotifier),
        ));
        (store, queue, service)
    }

    #[test]
    fn queues_exactly_the_due_pending_records() {
        let (store, queue, service) = setup();
        let now = Utc::now();
        // Inserted directly: these never reached the queue.
        for minutes in [1, 5, 60] {
            store.insert(&reminder(now - Duration::minutes(minutes))).unwrap();
        }
        for minutes in [10, 20] {
            store.insert(&reminder(now + Duration::minutes(minutes))).unwrap();
        }
        let settled = reminder(now - Duration::minutes(2));
        store.insert(&settled).unwrap();
        store
            .transition(&settled.id, ReminderStatus::Pending, ReminderStatus::Sent, now)
            .unwrap();

        let report = Reconciler::new(service, DEFAULT_BATCH_SIZE).run_at(now).unwrap();
        assert_eq!(report, ReconcileReport { queued: 3 });
        let stats = queue.stats().unwrap();
        assert_eq!(stats.waiting, 3);
        assert_eq!(stats.delayed, 0);
    }

    #[test]
    fn sweep_is_idempotent_and_leaves_status_alone() {
        let (store, queue, service) = setup();
        let now = Utc::now();
        let r = reminder(now - Duration::minutes(1));
        store.insert(&r).unwrap();
        let reconciler = Reconciler::new(service, DEFAULT_BATCH_SIZE);

        assert_eq!(reconciler.run_at(now).unwrap().queued, 1);
        assert_eq!(reconciler.run_at(now).unwrap().queued, 0);

        assert_eq!(queue.jobs_for_key(&r.id.job_key()).unwrap().len(), 1);
        assert_eq!(store.get(&r.id).unwrap().unwrap().status, ReminderStatus::Pending);
    }

    #[test]
    fn sweep_keeps_the_retry_history_of_a_backing_off_job() {
        let (store, queue, service) = setup();
        let now = Utc::now();
        let r = reminder(now - Duration::minutes(1));
        store.insert(&r).unwrap();
        service.schedule_at(&r, now).unwrap();

        let lease = std::time::Duration::from_secs(30);
        for at in [now, now + Duration::seconds(60)] {
            let job = match queue.claim_next("worker-a", lease, None, at).unwrap() {
                ClaimOutcome::Claimed(job) => job,
                other => panic!("expected a claim, got {other:?}"),
            };
            queue.fail(&job.id, "worker-a", "provider down", true, at).unwrap();
        }
        let before = queue.pending_for_key(&r.id.job_key()).unwrap().unwrap();
        assert_eq!(before.attempts_made, 2);

        let report = Reconciler::new(service, DEFAULT_BATCH_SIZE)
            .run_at(now + Duration::seconds(90))
            .unwrap();
        assert_eq!(report.queued, 0);
        let after = queue.pending_for_key(&r.id.job_key()).unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.attempts_made, 2);
        assert_eq!(after.run_at, before.run_at);
    }

    #[test]
    fn sweep_does_not_hand_a_running_job_to_a_second_worker() {
        let (store, queue, service) = setup();
        let now = Utc::now();
        let r = reminder(now - Duration::minutes(1));
        store.insert(&r).unwrap();
        service.schedule_at(&r, now).unwrap();
        let lease = std::time::Duration::from_secs(30);
        assert!(matches!(
            queue.claim_next("worker-a", lease, None, now).unwrap(),
            ClaimOutcome::Claimed(_)
        ));

        let report = Reconciler::new(service, DEFAULT_BATCH_SIZE).run_at(now).unwrap();
        assert_eq!(report.queued, 0);
        assert!(matches!(
            queue.claim_next("worker-b", lease, None, now).unwrap(),
            ClaimOutcome::Idle { .. }
        ));
        assert_eq!(queue.jobs_for_key(&r.id.job_key()).unwrap().len(), 1);
    }

    #[test]
    fn batch_size_caps_one_sweep() {
        let (store, _queue, service) = setup();
        let now = Utc::now();
        for minutes in 1..=5 {
            store.insert(&reminder(now - Duration::minutes(minutes))).unwrap();
        }
        let reconciler = Reconciler::new(service, 2);
        assert_eq!(reconciler.run_at(now).unwrap().queued, 2);
    }

    #[test]
    fn zero_batch_size_is_raised_to_one() {
        let (_store, _queue, service) = setup();
        assert_eq!(Reconciler::new(service, 0).batch_size(), 1);
    }
}
