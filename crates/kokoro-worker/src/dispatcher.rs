use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kokoro_queue::{ClaimOutcome, FailOutcome, Job, JobStore, QueueError, RateLimit, StallOutcome};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::HandlerError,
    events::{EventBus, WorkerEvent},
    handler::JobHandler,
};

const STALLED_MESSAGE: &str = "job stalled more than allowable limit";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum executions in flight in this process.
    pub concurrency: usize,
    /// Shared activation ceiling, enforced through the store.
    pub rate_limit: Option<RateLimit>,
    /// Lease length. Renewed every half lease while a handler runs.
    pub lock_ttl: Duration,
    pub stall_interval: Duration,
    pub max_stalled_count: u32,
    /// Upper bound on how long an idle dispatcher sleeps before re-checking.
    pub poll_interval: Duration,
    pub prune_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit: Some(RateLimit {
                max: 10,
                window: Duration::from_secs(1),
            }),
            lock_ttl: Duration::from_secs(30),
            stall_interval: Duration::from_secs(30),
            max_stalled_count: 1,
            poll_interval: Duration::from_secs(1),
            prune_interval: Duration::from_secs(60),
        }
    }
}

/// Pulls due jobs from a [`JobStore`] and runs them through a [`JobHandler`].
///
/// Several dispatchers (in one or many processes) may share the same store;
/// claims are leased, so a job is handed to one worker at a time.
pub struct Dispatcher {
    store: Arc<JobStore>,
    handler: Arc<dyn JobHandler>,
    config: DispatcherConfig,
    worker_id: String,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(store: Arc<JobStore>, handler: Arc<dyn JobHandler>, config: DispatcherConfig) -> Self {
        Self {
            store,
            handler,
            config,
            worker_id: format!("worker-{}", Uuid::new_v4()),
            events: EventBus::new(),
        }
    }

    /// Publish on an existing bus instead of a private one.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Run until `shutdown` is cancelled, then wait for in-flight executions.
    pub async fn run(self, shutdown: CancellationToken) {
        let this = Arc::new(self);
        let slots = Arc::new(Semaphore::new(this.config.concurrency.max(1)));
        let wakeup = this.store.wakeup();
        let mut in_flight = JoinSet::new();

        let mut stall_tick = tokio::time::interval(this.config.stall_interval);
        stall_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut prune_tick = tokio::time::interval(this.config.prune_interval);
        prune_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            worker_id = %this.worker_id,
            queue = %this.store.name(),
            concurrency = this.config.concurrency,
            "dispatcher started"
        );

        loop {
            while let Some(done) = in_flight.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "job task panicked");
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = stall_tick.tick() => this.sweep_stalled().await,
                _ = prune_tick.tick() => this.prune(),
                permit = Arc::clone(&slots).acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    let wait = match this.store.claim_next(
                        &this.worker_id,
                        this.config.lock_ttl,
                        this.config.rate_limit,
                        Utc::now(),
                    ) {
                        Ok(ClaimOutcome::Claimed(job)) => {
                            let this = Arc::clone(&this);
                            in_flight.spawn(async move {
                                this.execute(job).await;
                                drop(permit);
                            });
                            continue;
                        }
                        Ok(ClaimOutcome::Idle { next_run_at }) => {
                            idle_wait(next_run_at, this.config.poll_interval, Utc::now())
                        }
                        Ok(ClaimOutcome::RateLimited { retry_after }) => {
                            debug!(retry_after_ms = retry_after.as_millis() as u64, "rate limit reached");
                            retry_after
                        }
                        Err(e) => {
                            this.report_store_error("claim", &e);
                            this.config.poll_interval
                        }
                    };
                    drop(permit);

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                        _ = wakeup.notified() => {}
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "dispatcher stopping, draining in-flight jobs");
        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "job task panicked");
            }
        }
        info!(worker_id = %this.worker_id, "dispatcher stopped");
    }

    async fn execute(&self, job: Job) {
        let attempt = job.attempt();
        self.events.emit(WorkerEvent::Started {
            job_id: job.id.clone(),
            key: job.key.clone(),
            attempt,
        });
        let started = Instant::now();

        let result = tokio::select! {
            result = self.handler.execute(&job) => result,
            never = self.keep_lease(&job.id) => match never {},
        };

        match result {
            Ok(()) => match self.store.complete(&job.id, &self.worker_id, Utc::now()) {
                Ok(()) => self.events.emit(WorkerEvent::Completed {
                    job_id: job.id.clone(),
                    key: job.key.clone(),
                    attempt,
                    duration_ms: started.elapsed().as_millis() as u64,
                }),
                Err(e) => self.report_store_error("complete", &e),
            },
            Err(err) => self.record_failure(&job, err).await,
        }
    }

    async fn record_failure(&self, job: &Job, err: HandlerError) {
        let message = err.to_string();
        match self
            .store
            .fail(&job.id, &self.worker_id, &message, err.is_retryable(), Utc::now())
        {
            Ok(FailOutcome::Retrying { attempt, delay }) => {
                self.events.emit(WorkerEvent::Retrying {
                    job_id: job.id.clone(),
                    key: job.key.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: message,
                });
            }
            Ok(FailOutcome::Exhausted { attempts }) => {
                self.handler.on_terminal_failure(job, &message).await;
                self.events.emit(WorkerEvent::Failed {
                    job_id: job.id.clone(),
                    key: job.key.clone(),
                    attempts,
                    error: message,
                });
            }
            Ok(FailOutcome::Superseded) => {
                debug!(job_id = %job.id, key = %job.key, "failed job superseded by a newer one");
            }
            Err(e) => self.report_store_error("fail", &e),
        }
    }

    /// Renews the lease every half TTL. Never completes; dropped together
    /// with the handler future.
    async fn keep_lease(&self, job_id: &str) -> Infallible {
        let every = (self.config.lock_ttl / 2).max(Duration::from_millis(10));
        loop {
            tokio::time::sleep(every).await;
            if let Err(e) =
                self.store
                    .heartbeat(job_id, &self.worker_id, self.config.lock_ttl, Utc::now())
            {
                warn!(%job_id, error = %e, "lease renewal failed");
                if matches!(e, QueueError::LeaseLost { .. }) {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    async fn sweep_stalled(&self) {
        let stalled = match self
            .store
            .recover_stalled(self.config.max_stalled_count, Utc::now())
        {
            Ok(stalled) => stalled,
            Err(e) => {
                self.report_store_error("stall sweep", &e);
                return;
            }
        };

        for s in stalled {
            self.events.emit(WorkerEvent::Stalled {
                job_id: s.job.id.clone(),
                key: s.job.key.clone(),
                outcome: s.outcome,
            });
            if s.outcome == StallOutcome::Failed {
                self.handler.on_terminal_failure(&s.job, STALLED_MESSAGE).await;
                self.events.emit(WorkerEvent::Failed {
                    job_id: s.job.id.clone(),
                    key: s.job.key.clone(),
                    attempts: s.job.attempt(),
                    error: STALLED_MESSAGE.to_string(),
                });
            }
        }
    }

    fn prune(&self) {
        if let Err(e) = self.store.prune(Utc::now()) {
            self.report_store_error("prune", &e);
        }
    }

    fn report_store_error(&self, during: &str, e: &QueueError) {
        error!(worker_id = %self.worker_id, %during, error = %e, "job store error");
        self.events.emit(WorkerEvent::Error {
            message: format!("{during}: {e}"),
        });
    }
}

/// How long to sleep when nothing is due: until the next pending job, capped
/// by the poll interval.
fn idle_wait(next_run_at: Option<DateTime<Utc>>, poll: Duration, now: DateTime<Utc>) -> Duration {
    match next_run_at {
        Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO).min(poll),
        None => poll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kokoro_queue::{JobQueue, NewJob, QueueOptions};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::timeout;

    #[derive(Default)]
    struct ScriptedHandler {
        /// Fail this many calls before succeeding.
        failures: u32,
        permanent: bool,
        delay: Duration,
        calls: AtomicU32,
        running: AtomicUsize,
        max_running: AtomicUsize,
        terminal: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn execute(&self, _job: &Job) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if call <= self.failures {
                if self.permanent {
                    return Err(HandlerError::Permanent("bad payload".into()));
                }
                return Err(HandlerError::Retryable("provider down".into()));
            }
            Ok(())
        }

        async fn on_terminal_failure(&self, job: &Job, error: &str) {
            self.terminal
                .lock()
                .unwrap()
                .push(format!("{}: {error}", job.key));
        }
    }

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            concurrency: 2,
            rate_limit: None,
            lock_ttl: Duration::from_secs(30),
            stall_interval: Duration::from_secs(30),
            max_stalled_count: 1,
            poll_interval: Duration::from_millis(20),
            prune_interval: Duration::from_secs(60),
        }
    }

    fn store(backoff_ms: u64) -> Arc<JobStore> {
        Arc::new(
            JobStore::open_in_memory(
                QueueOptions::new("test")
                    .attempts(3)
                    .backoff(Duration::from_millis(backoff_ms)),
            )
            .unwrap(),
        )
    }

    fn enqueue(store: &JobStore, key: &str) {
        store
            .enqueue(NewJob {
                key: key.into(),
                name: "send-reminder".into(),
                payload: serde_json::json!({}),
                delay: Duration::ZERO,
                priority: 3,
            })
            .unwrap();
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<WorkerEvent>,
        pred: impl Fn(&WorkerEvent) -> bool,
    ) -> WorkerEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event did not arrive in time")
    }

    #[tokio::test]
    async fn due_job_runs_and_completes() {
        let store = store(10);
        enqueue(&store, "reminder:1");
        let handler = Arc::new(ScriptedHandler::default());
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let started = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Started { .. })).await;
        assert_eq!(started.key(), Some("reminder:1"));
        let done = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Completed { .. })).await;
        assert!(matches!(done, WorkerEvent::Completed { attempt: 1, .. }));

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(store.stats().unwrap().completed, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let store = store(10);
        for i in 0..6 {
            enqueue(&store, &format!("reminder:{i}"));
        }
        let handler = Arc::new(ScriptedHandler {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        for _ in 0..6 {
            wait_for(&mut rx, |e| matches!(e, WorkerEvent::Completed { .. })).await;
        }
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 6);
        assert!(handler.max_running.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.stats().unwrap().completed, 6);
    }

    #[tokio::test]
    async fn rate_ceiling_holds_with_free_slots() {
        let store = store(10);
        for i in 0..6 {
            enqueue(&store, &format!("reminder:{i}"));
        }
        let handler = Arc::new(ScriptedHandler::default());
        let config = DispatcherConfig {
            concurrency: 4,
            // Long enough that the whole test sits inside one window.
            rate_limit: Some(RateLimit {
                max: 2,
                window: Duration::from_secs(86_400),
            }),
            ..test_config()
        };
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), config);
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        for _ in 0..2 {
            wait_for(&mut rx, |e| matches!(e, WorkerEvent::Completed { .. })).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut started = 2;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, WorkerEvent::Started { .. }) {
                started += 1;
            }
        }

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(started, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        let stats = store.stats().unwrap();
        assert_eq!((stats.completed, stats.waiting), (2, 4));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_backoff() {
        let store = store(10);
        enqueue(&store, "reminder:1");
        let handler = Arc::new(ScriptedHandler {
            failures: 1,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let retry = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Retrying { .. })).await;
        assert!(matches!(
            retry,
            WorkerEvent::Retrying { attempt: 1, delay_ms: 10, .. }
        ));
        let done = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Completed { .. })).await;
        assert!(matches!(done, WorkerEvent::Completed { attempt: 2, .. }));

        shutdown.cancel();
        task.await.unwrap();
        assert!(handler.terminal.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_job_reports_terminal_failure_once() {
        let store = store(5);
        enqueue(&store, "reminder:1");
        let handler = Arc::new(ScriptedHandler {
            failures: u32::MAX,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let failed = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Failed { .. })).await;
        assert!(matches!(failed, WorkerEvent::Failed { attempts: 3, .. }));

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            handler.terminal.lock().unwrap().as_slice(),
            ["reminder:1: provider down"]
        );
        assert_eq!(store.stats().unwrap().failed, 1);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let store = store(5);
        enqueue(&store, "reminder:1");
        let handler = Arc::new(ScriptedHandler {
            failures: 1,
            permanent: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let failed = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Failed { .. })).await;
        assert!(matches!(failed, WorkerEvent::Failed { attempts: 1, .. }));

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_in_flight_jobs() {
        let store = store(10);
        enqueue(&store, "reminder:1");
        let handler = Arc::new(ScriptedHandler {
            delay: Duration::from_millis(150),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), test_config());
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        wait_for(&mut rx, |e| matches!(e, WorkerEvent::Started { .. })).await;
        shutdown.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        assert_eq!(store.stats().unwrap().completed, 1);
    }

    #[tokio::test]
    async fn stalled_job_is_picked_up_again() {
        let store = store(10);
        enqueue(&store, "reminder:1");
        // A worker that claimed the job and died before finishing it.
        let claimed = store
            .claim_next("dead-worker", Duration::from_millis(1), None, Utc::now())
            .unwrap();
        assert!(matches!(claimed, ClaimOutcome::Claimed(_)));

        let handler = Arc::new(ScriptedHandler::default());
        let config = DispatcherConfig {
            stall_interval: Duration::from_millis(20),
            ..test_config()
        };
        let dispatcher = Dispatcher::new(store.clone(), handler.clone(), config);
        let mut rx = dispatcher.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(shutdown.clone()));

        let stalled = wait_for(&mut rx, |e| matches!(e, WorkerEvent::Stalled { .. })).await;
        assert!(matches!(
            stalled,
            WorkerEvent::Stalled {
                outcome: StallOutcome::Requeued,
                ..
            }
        ));
        wait_for(&mut rx, |e| matches!(e, WorkerEvent::Completed { .. })).await;

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_wait_is_capped_by_poll_interval() {
        let now = Utc::now();
        let poll = Duration::from_secs(1);
        assert_eq!(idle_wait(None, poll, now), poll);
        assert_eq!(
            idle_wait(Some(now + chrono::Duration::milliseconds(250)), poll, now),
            Duration::from_millis(250)
        );
        assert_eq!(
            idle_wait(Some(now + chrono::Duration::seconds(90)), poll, now),
            poll
        );
        assert_eq!(
            idle_wait(Some(now - chrono::Duration::seconds(1)), poll, now),
            Duration::ZERO
        );
    }
}
