use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::Stream;
use kokoro_queue::{JobQueue, QueueStats};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::app::AppState;
use crate::auth::Caller;
use crate::error::{queue_error, ApiResult};

/// GET /api/queue/stats
pub async fn stats(State(state): State<Arc<AppState>>, _caller: Caller) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.queue.stats().map_err(queue_error)?))
}

/// GET /api/queue/events: worker lifecycle events as server-sent events.
pub async fn events(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let shutdown = state.shutdown.clone();
    let stream = async_stream::stream! {
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = rx.recv() => next,
            };
            match next {
                Ok(event) => match Event::default().event(event.kind()).json_data(&event) {
                    Ok(sse) => yield Ok(sse),
                    Err(e) => warn!(error = %e, "could not encode worker event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
