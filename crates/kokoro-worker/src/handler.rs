use async_trait::async_trait;
use kokoro_queue::Job;

use crate::error::HandlerError;

/// Executes claimed jobs on behalf of the [`crate::Dispatcher`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one activation of `job`. Called once per claim.
    async fn execute(&self, job: &Job) -> Result<(), HandlerError>;

    /// Called once when `job` reaches the terminal failed state, either
    /// because attempts ran out or because it stalled too often.
    async fn on_terminal_failure(&self, job: &Job, error: &str);
}
