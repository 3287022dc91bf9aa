pub mod config;
pub mod error;
pub mod recurrence;
pub mod types;
