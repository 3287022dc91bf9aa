//! Fallback trigger: `GET|POST /api/cron/process-reminders`.
//!
//! Called by an external scheduler every few minutes, or by an operator.
//! Authenticated with `Authorization: Bearer <gateway.cron_secret>`.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::auth::check_bearer;
use crate::error::{queue_error, ApiResult};

pub async fn process_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    check_bearer(&headers, state.config.gateway.cron_secret.as_deref())?;

    let report = state.reconciler.run_once()?;
    let stats = state.queue.stats_at(chrono::Utc::now()).map_err(queue_error)?;
    info!(queued = report.queued, "fallback sweep finished");

    Ok(Json(json!({
        "queued": report.queued,
        "queueStats": stats,
    })))
}
