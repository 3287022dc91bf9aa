//! `kokoro-worker`: bounded worker pool over a [`kokoro_queue::JobStore`].
//!
//! The [`Dispatcher`] claims due jobs, runs them through a [`JobHandler`]
//! with at most `concurrency` executions in flight, renews leases while a
//! handler runs, applies the retry policy recorded in the store and
//! publishes a [`WorkerEvent`] for every state change.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::HandlerError;
pub use events::{EventBus, WorkerEvent};
pub use handler::JobHandler;
