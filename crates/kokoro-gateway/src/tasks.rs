use std::sync::Arc;
use std::time::Duration;

use kokoro_reminders::Reconciler;
use kokoro_worker::{EventBus, WorkerEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Log every worker event until `shutdown`.
pub async fn log_events(events: EventBus, shutdown: CancellationToken) {
    let mut rx = events.subscribe();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(event) => log_event(&event),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Started { job_id, key, attempt } => {
            debug!(%job_id, %key, attempt, "job started");
        }
        WorkerEvent::Completed {
            job_id,
            key,
            attempt,
            duration_ms,
        } => info!(%job_id, %key, attempt, duration_ms, "job completed"),
        WorkerEvent::Retrying {
            job_id,
            key,
            attempt,
            delay_ms,
            error,
        } => warn!(%job_id, %key, attempt, delay_ms, %error, "job failed, will retry"),
        WorkerEvent::Failed {
            job_id,
            key,
            attempts,
            error,
        } => error!(%job_id, %key, attempts, %error, "job failed permanently"),
        WorkerEvent::Stalled {
            job_id,
            key,
            outcome,
        } => warn!(%job_id, %key, ?outcome, "job stalled"),
        WorkerEvent::Error { message } => error!(%message, "worker error"),
    }
}

/// Run the fallback sweep every `every` until `shutdown`.
pub async fn reconcile_loop(reconciler: Arc<Reconciler>, every: Duration, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(every_secs = every.as_secs(), "reconcile ticker started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                if let Err(e) = reconciler.run_once() {
                    error!(error = %e, "fallback sweep failed");
                }
            }
        }
    }
    debug!("reconcile ticker stopped");
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
