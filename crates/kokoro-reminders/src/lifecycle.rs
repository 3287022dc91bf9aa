use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kokoro_core::recurrence::next_occurrence;
use kokoro_core::types::{ReminderId, ReminderStatus, UserId, SEND_REMINDER_JOB};
use kokoro_notify::{Notifier, ReminderMessage};
use kokoro_queue::{JobHandle, JobQueue, NewJob};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ReminderError, Result};
use crate::model::{NewReminder, Page, Reminder, ReminderFilter, ReminderJob, ReminderPatch};
use crate::store::ReminderStore;
use crate::validate;

/// What one activation of a reminder job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Delivered and marked sent. `successor` is the next occurrence, when
    /// the reminder recurs and the successor could be created.
    Sent { successor: Option<ReminderId> },
    /// The record was no longer pending; nothing was sent.
    AlreadySettled(ReminderStatus),
    /// The record was deleted after the job was queued.
    Missing,
}

/// Owns every reminder status transition and keeps the job queue in step
/// with the record store.
///
/// The record store is the source of truth. Queue writes made on behalf of
/// the owner (create, edit, cancel, delete) are best-effort: a failure is
/// logged and the [`crate::Reconciler`] re-drives the reminder once it is due.
pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    queue: Arc<dyn JobQueue>,
    notifier: Arc<dyn Notifier>,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        queue: Arc<dyn JobQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            queue,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    // ── Owner entry points ───────────────────────────────────────────────────

    pub fn create(&self, owner: &UserId, input: NewReminder) -> Result<Reminder> {
        self.create_at(owner, input, Utc::now())
    }

    /// Validate, persist as pending, then try to queue the first activation.
    #[instrument(skip(self, input), fields(user_id = %owner))]
    pub fn create_at(&self, owner: &UserId, input: NewReminder, now: DateTime<Utc>) -> Result<Reminder> {
        let input = validate::new_reminder(input, now)?;
        let now = crate::model::to_millis_precision(now);
        let reminder = Reminder {
            id: ReminderId::new(),
            user_id: owner.clone(),
            title: input.title,
            description: input.description,
            scheduled_at: input.scheduled_at,
            recurrence: input.recurrence,
            priority: input.priority,
            status: ReminderStatus::Pending,
            email: input.email,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&reminder)?;
        info!(reminder_id = %reminder.id, scheduled_at = %reminder.scheduled_at, "reminder created");

        self.schedule_best_effort(&reminder, now);
        Ok(reminder)
    }

    pub fn get(&self, owner: &UserId, id: &ReminderId) -> Result<Reminder> {
        self.store
            .get_owned(id, owner)?
            .ok_or_else(|| ReminderError::NotFound { id: id.to_string() })
    }

    pub fn list(&self, owner: &UserId, filter: &ReminderFilter) -> Result<Page<Reminder>> {
        self.store.list_owned(owner, filter)
    }

    pub fn update(&self, owner: &UserId, id: &ReminderId, patch: ReminderPatch) -> Result<Reminder> {
        self.update_at(owner, id, patch, Utc::now())
    }

    /// Apply an owner edit. A pending reminder has its queued job replaced
    /// with the new snapshot; the status never changes here.
    #[instrument(skip(self, patch), fields(user_id = %owner, reminder_id = %id))]
    pub fn update_at(
        &self,
        owner: &UserId,
        id: &ReminderId,
        patch: ReminderPatch,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        let mut reminder = self.get(owner, id)?;

        if let Some(title) = patch.title {
            reminder.title = validate::title(&title)?;
        }
        if let Some(description) = patch.description {
            reminder.description = validate::description(description.as_deref())?;
        }
        if let Some(at) = patch.scheduled_at {
            reminder.scheduled_at = validate::scheduled_at(at, now)?;
        }
        if let Some(recurrence) = patch.recurrence {
            reminder.recurrence = recurrence;
        }
        if let Some(priority) = patch.priority {
            reminder.priority = validate::priority(priority)?;
        }
        if let Some(email) = patch.email {
            reminder.email = validate::email(&email)?;
        }

        let now = crate::model::to_millis_precision(now);
        reminder.updated_at = now;
        self.store.update(&reminder)?;
        debug!("reminder updated");

        if reminder.status == ReminderStatus::Pending {
            self.schedule_best_effort(&reminder, now);
        }
        Ok(reminder)
    }

    /// Move a pending reminder to cancelled and drop its queued job.
    #[instrument(skip(self), fields(user_id = %owner, reminder_id = %id))]
    pub fn cancel(&self, owner: &UserId, id: &ReminderId) -> Result<Reminder> {
        let reminder = self.get(owner, id)?;
        if !reminder.status.can_transition_to(ReminderStatus::Cancelled) {
            return Err(ReminderError::InvalidTransition {
                from: reminder.status,
                to: ReminderStatus::Cancelled,
            });
        }

        self.unschedule_best_effort(id);

        let now = crate::model::to_millis_precision(Utc::now());
        if !self
            .store
            .transition(id, ReminderStatus::Pending, ReminderStatus::Cancelled, now)?
        {
            // Settled by a worker between the read and the write.
            let current = self.get(owner, id)?;
            return Err(ReminderError::InvalidTransition {
                from: current.status,
                to: ReminderStatus::Cancelled,
            });
        }
        info!("reminder cancelled");
        self.get(owner, id)
    }

    /// Delete the record and its queued job. Returns the deleted record.
    #[instrument(skip(self), fields(user_id = %owner, reminder_id = %id))]
    pub fn delete(&self, owner: &UserId, id: &ReminderId) -> Result<Reminder> {
        let reminder = self.get(owner, id)?;
        self.unschedule_best_effort(id);
        if !self.store.delete_owned(id, owner)? {
            return Err(ReminderError::NotFound { id: id.to_string() });
        }
        info!("reminder deleted");
        Ok(reminder)
    }

    // ── Worker entry points ──────────────────────────────────────────────────

    /// Deliver one activation of `job`.
    ///
    /// Safe to call more than once for the same reminder: anything other than
    /// a pending record is a no-op. A delivery error is returned untouched so
    /// the dispatcher's retry policy decides what happens next.
    #[instrument(skip(self, job), fields(reminder_id = %job.reminder_id))]
    pub async fn execute(&self, job: &ReminderJob) -> Result<ExecuteOutcome> {
        let Some(current) = self.store.get(&job.reminder_id)? else {
            info!("reminder no longer exists, skipping");
            return Ok(ExecuteOutcome::Missing);
        };
        if current.status.is_terminal() {
            debug!(status = %current.status, "reminder already settled, skipping");
            return Ok(ExecuteOutcome::AlreadySettled(current.status));
        }

        let message = ReminderMessage {
            to: job.email.clone(),
            title: job.title.clone(),
            description: job.description.clone(),
            scheduled_at: job.scheduled_at,
            priority: job.priority,
        };
        self.notifier.send(&message).await?;

        let now = crate::model::to_millis_precision(Utc::now());
        if !self
            .store
            .transition(&job.reminder_id, ReminderStatus::Pending, ReminderStatus::Sent, now)?
        {
            let status = self
                .store
                .get(&job.reminder_id)?
                .map(|r| r.status)
                .unwrap_or(ReminderStatus::Cancelled);
            warn!(%status, "reminder settled while it was being delivered");
            return Ok(ExecuteOutcome::AlreadySettled(status));
        }
        info!(notifier = self.notifier.name(), "reminder sent");

        if !job.recurrence.is_recurring() {
            return Ok(ExecuteOutcome::Sent { successor: None });
        }
        let successor = match self.create_successor(job, now) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, "failed to create next occurrence");
                None
            }
        };
        Ok(ExecuteOutcome::Sent { successor })
    }

    /// Terminal failure: attempts exhausted or stalled too often.
    /// Returns `false` when the reminder was not pending.
    #[instrument(skip(self), fields(reminder_id = %id))]
    pub fn mark_failed(&self, id: &ReminderId, reason: &str) -> Result<bool> {
        let now = crate::model::to_millis_precision(Utc::now());
        let moved = self
            .store
            .transition(id, ReminderStatus::Pending, ReminderStatus::Failed, now)?;
        if moved {
            warn!(%reason, "reminder marked failed");
        } else {
            debug!("reminder not pending, failure not recorded");
        }
        Ok(moved)
    }

    // ── Queue plumbing ───────────────────────────────────────────────────────

    pub fn schedule(&self, reminder: &Reminder) -> Result<JobHandle> {
        self.schedule_at(reminder, Utc::now())
    }

    /// Enqueue (or replace) the job for `reminder`. Overdue reminders run
    /// immediately.
    pub fn schedule_at(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<JobHandle> {
        let job = job_for(reminder, now)?;
        let delay = job.delay;
        let handle = self.queue.enqueue(job)?;
        debug!(
            reminder_id = %reminder.id,
            job_id = %handle.id,
            delay_ms = delay.as_millis() as u64,
            replaced = handle.replaced,
            "reminder job queued"
        );
        Ok(handle)
    }

    /// Queue `reminder` only if its key has no pending or running job.
    /// Returns `None` when a live job already covers it.
    pub fn ensure_scheduled_at(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<Option<JobHandle>> {
        let handle = self.queue.enqueue_if_absent(job_for(reminder, now)?)?;
        match &handle {
            Some(h) => debug!(reminder_id = %reminder.id, job_id = %h.id, "reminder job restored"),
            None => debug!(reminder_id = %reminder.id, "reminder job still live"),
        }
        Ok(handle)
    }

    fn schedule_best_effort(&self, reminder: &Reminder, now: DateTime<Utc>) {
        if let Err(e) = self.schedule_at(reminder, now) {
            warn!(reminder_id = %reminder.id, error = %e, "could not queue reminder, reconciler will retry");
        }
    }

    fn unschedule_best_effort(&self, id: &ReminderId) {
        match self.queue.cancel(&id.job_key()) {
            Ok(removed) => debug!(reminder_id = %id, removed, "reminder job removed"),
            Err(e) => warn!(reminder_id = %id, error = %e, "could not remove reminder job"),
        }
    }

    /// Next occurrence counted from the original instant, not from now.
    fn create_successor(&self, job: &ReminderJob, now: DateTime<Utc>) -> Result<ReminderId> {
        let scheduled_at = next_occurrence(job.scheduled_at, job.recurrence).ok_or_else(|| {
            ReminderError::Internal(format!(
                "no {} occurrence after {}",
                job.recurrence, job.scheduled_at
            ))
        })?;
        let next = Reminder {
            id: ReminderId::new(),
            user_id: job.user_id.clone(),
            title: job.title.clone(),
            description: job.description.clone(),
            scheduled_at,
            recurrence: job.recurrence,
            priority: job.priority,
            status: ReminderStatus::Pending,
            email: job.email.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&next)?;
        info!(next_id = %next.id, scheduled_at = %next.scheduled_at, "next occurrence created");
        self.schedule_best_effort(&next, now);
        Ok(next.id)
    }
}

fn job_for(reminder: &Reminder, now: DateTime<Utc>) -> Result<NewJob> {
    let payload = serde_json::to_value(ReminderJob::from(reminder))
        .map_err(|e| ReminderError::Payload(e.to_string()))?;
    Ok(NewJob {
        key: reminder.id.job_key(),
        name: SEND_REMINDER_JOB.to_string(),
        payload,
        delay: (reminder.scheduled_at - now).to_std().unwrap_or(Duration::ZERO),
        priority: reminder.priority.rank(),
    })
}
