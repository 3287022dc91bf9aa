//! `kokoro-reminders`: reminder records and their delivery lifecycle.
//!
//! Records live in a SQLite `reminders` table behind [`ReminderStore`].
//! [`ReminderService`] owns every status transition and keeps the job queue
//! in step with the records; [`Reconciler`] re-drives reminders that are due
//! but never made it into the queue. [`ReminderJobHandler`] plugs the
//! service into a [`kokoro_worker::Dispatcher`].

pub mod db;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod validate;

pub use error::{ReminderError, Result};
pub use handler::ReminderJobHandler;
pub use lifecycle::{ExecuteOutcome, ReminderService};
pub use model::{NewReminder, Page, Reminder, ReminderFilter, ReminderJob, ReminderPatch};
pub use reconcile::{ReconcileReport, Reconciler};
pub use store::{ReminderStore, SqliteReminderStore};
