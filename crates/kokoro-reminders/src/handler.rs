use std::sync::Arc;

use async_trait::async_trait;
use kokoro_core::types::ReminderId;
use kokoro_queue::Job;
use kokoro_worker::{HandlerError, JobHandler};
use tracing::{debug, error, warn};

use crate::error::ReminderError;
use crate::lifecycle::{ExecuteOutcome, ReminderService};
use crate::model::ReminderJob;

/// Runs `send-reminder` jobs through the [`ReminderService`].
pub struct ReminderJobHandler {
    service: Arc<ReminderService>,
}

impl ReminderJobHandler {
    pub fn new(service: Arc<ReminderService>) -> Self {
        Self { service }
    }
}

fn decode(job: &Job) -> Result<ReminderJob, ReminderError> {
    serde_json::from_value(job.payload.clone()).map_err(|e| ReminderError::Payload(e.to_string()))
}

fn classify(e: ReminderError) -> HandlerError {
    if e.is_transient() {
        HandlerError::Retryable(e.to_string())
    } else {
        HandlerError::Permanent(e.to_string())
    }
}

#[async_trait]
impl JobHandler for ReminderJobHandler {
    async fn execute(&self, job: &Job) -> Result<(), HandlerError> {
        let payload = decode(job).map_err(|e| {
            error!(job_id = %job.id, key = %job.key, error = %e, "undecodable reminder job");
            classify(e)
        })?;
        match self.service.execute(&payload).await.map_err(classify)? {
            ExecuteOutcome::Sent { successor } => {
                debug!(job_id = %job.id, successor = ?successor.as_ref().map(|s| s.as_str()), "job delivered");
            }
            ExecuteOutcome::AlreadySettled(status) => {
                debug!(job_id = %job.id, %status, "duplicate activation ignored");
            }
            ExecuteOutcome::Missing => {}
        }
        Ok(())
    }

    async fn on_terminal_failure(&self, job: &Job, error: &str) {
        let id = decode(job)
            .map(|p| p.reminder_id)
            .ok()
            .or_else(|| ReminderId::from_job_key(&job.key));
        let Some(id) = id else {
            warn!(job_id = %job.id, key = %job.key, "terminal failure for a job with no reminder id");
            return;
        };
        if let Err(e) = self.service.mark_failed(&id, error) {
            error!(reminder_id = %id, error = %e, "could not record reminder failure");
        }
    }
}
