//! Process-scoped handles: opened once at startup, shared by reference, closed
//! on shutdown.

use std::sync::Arc;
use std::time::Duration;

use kokoro_core::config::{KokoroConfig, QueueConfig, WorkerConfig};
use kokoro_queue::{JobStore, QueueOptions, RateLimit, RetentionPolicy};
use kokoro_reminders::{Reconciler, ReminderJobHandler, ReminderService, SqliteReminderStore};
use kokoro_worker::{Dispatcher, DispatcherConfig, EventBus};
use tracing::{debug, info, warn};

pub struct Services {
    pub queue: Arc<JobStore>,
    pub reminders: Arc<ReminderService>,
    pub reconciler: Arc<Reconciler>,
    pub events: EventBus,
}

impl Services {
    pub fn open(config: &KokoroConfig) -> anyhow::Result<Self> {
        info!(path = %config.database.path, "opening record store");
        let store = Arc::new(SqliteReminderStore::open(&config.database.path)?);

        info!(path = %config.queue.path, queue = %config.queue.name, "opening job store");
        let queue = Arc::new(JobStore::open(&config.queue.path, queue_options(&config.queue))?);

        let notifier = kokoro_notify::build_notifier(&config.notifier)?;
        info!(provider = notifier.name(), "notifier ready");

        let reminders = Arc::new(ReminderService::new(store, queue.clone(), notifier));
        let reconciler = Arc::new(Reconciler::new(
            reminders.clone(),
            config.reconcile.batch_size,
        ));

        Ok(Self {
            queue,
            reminders,
            reconciler,
            events: EventBus::new(),
        })
    }

    /// A dispatcher publishing on the shared event bus.
    pub fn dispatcher(&self, worker: &WorkerConfig) -> Dispatcher {
        Dispatcher::new(
            self.queue.clone(),
            Arc::new(ReminderJobHandler::new(self.reminders.clone())),
            dispatcher_config(worker),
        )
        .with_events(self.events.clone())
    }

    /// Drop every handle and close the queue connection. Callers must have
    /// stopped all tasks holding clones first.
    pub fn close(self) {
        let Services {
            queue,
            reminders,
            reconciler,
            events: _,
        } = self;
        drop(reconciler);
        drop(reminders);
        match Arc::try_unwrap(queue) {
            Ok(queue) => {
                if let Err(e) = queue.close() {
                    warn!(error = %e, "job store did not close cleanly");
                }
            }
            Err(_) => debug!("job store still shared, closing on drop"),
        }
    }
}

pub fn queue_options(queue: &QueueConfig) -> QueueOptions {
    QueueOptions::new(queue.name.clone())
        .attempts(queue.attempts)
        .backoff(Duration::from_millis(queue.backoff_ms))
        .retention(RetentionPolicy {
            completed_max_age: Duration::from_secs(queue.completed_max_age_secs),
            completed_max_count: queue.completed_max_count,
            failed_max_age: Duration::from_secs(queue.failed_max_age_secs),
            failed_max_count: queue.failed_max_count,
        })
}

pub fn dispatcher_config(worker: &WorkerConfig) -> DispatcherConfig {
    DispatcherConfig {
        concurrency: worker.concurrency,
        rate_limit: Some(RateLimit {
            max: worker.rate_limit_max,
            window: Duration::from_millis(worker.rate_limit_window_ms),
        }),
        lock_ttl: Duration::from_secs(worker.lock_ttl_secs),
        stall_interval: Duration::from_secs(worker.stall_interval_secs.max(1)),
        max_stalled_count: worker.max_stalled_count,
        poll_interval: Duration::from_millis(worker.poll_interval_ms.max(1)),
        prune_interval: Duration::from_secs(worker.prune_interval_secs.max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_onto_the_worker_pool() {
        let config = dispatcher_config(&WorkerConfig::default());
        assert_eq!(config.concurrency, 5);
        assert_eq!(
            config.rate_limit,
            Some(RateLimit {
                max: 10,
                window: Duration::from_secs(1)
            })
        );

        let options = queue_options(&QueueConfig::default());
        assert_eq!(options.name, "kokoro-reminders");
        assert_eq!(options.attempts, 3);
        assert_eq!(options.backoff, Duration::from_secs(60));
    }
}
