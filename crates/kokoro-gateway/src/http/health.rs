use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health: process liveness.
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/health/store: probe the job store connection.
///
/// 200 when connected, 503 when not.
pub async fn store_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let health = state.queue.ping();
    let store = match serde_json::to_value(&health) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
        }
    };
    let (status, label) = if health.connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (
        status,
        Json(json!({
            "status": label,
            "timestamp": Utc::now().to_rfc3339(),
            "store": store,
        })),
    )
}
