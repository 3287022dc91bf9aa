pub mod cron;
pub mod health;
pub mod queue;
pub mod reminders;
