use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use kokoro_core::config::KokoroConfig;
use kokoro_queue::JobStore;
use kokoro_reminders::{Reconciler, ReminderService};
use kokoro_worker::EventBus;
use tokio_util::sync::CancellationToken;

use crate::http::{cron, health, queue, reminders};
use crate::services::Services;

/// Shared state handed to every handler as `Arc<AppState>`.
pub struct AppState {
    pub config: KokoroConfig,
    pub reminders: Arc<ReminderService>,
    pub reconciler: Arc<Reconciler>,
    pub queue: Arc<JobStore>,
    pub events: EventBus,
    /// Cancelled on shutdown so long-lived responses end.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: KokoroConfig, services: &Services, shutdown: CancellationToken) -> Self {
        Self {
            config,
            reminders: services.reminders.clone(),
            reconciler: services.reconciler.clone(),
            queue: services.queue.clone(),
            events: services.events.clone(),
            shutdown,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::liveness))
        .route("/api/health/store", get(health::store_health))
        .route(
            "/api/cron/process-reminders",
            get(cron::process_reminders).post(cron::process_reminders),
        )
        .route("/api/queue/stats", get(queue::stats))
        .route("/api/queue/events", get(queue::events))
        .route(
            "/api/reminders",
            get(reminders::list).post(reminders::create),
        )
        .route(
            "/api/reminders/{id}",
            get(reminders::get_one)
                .patch(reminders::update)
                .delete(reminders::delete),
        )
        .route("/api/reminders/{id}/cancel", post(reminders::cancel))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
