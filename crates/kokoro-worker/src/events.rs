use kokoro_queue::StallOutcome;
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Lifecycle events published by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Started {
        job_id: String,
        key: String,
        attempt: u32,
    },
    Completed {
        job_id: String,
        key: String,
        attempt: u32,
        duration_ms: u64,
    },
    Retrying {
        job_id: String,
        key: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// Terminal. No further attempts will be made.
    Failed {
        job_id: String,
        key: String,
        attempts: u32,
        error: String,
    },
    Stalled {
        job_id: String,
        key: String,
        outcome: StallOutcome,
    },
    /// The dispatcher itself hit an error (store unreachable and similar).
    Error { message: String },
}

impl WorkerEvent {
    /// Same string as the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Started { .. } => "started",
            WorkerEvent::Completed { .. } => "completed",
            WorkerEvent::Retrying { .. } => "retrying",
            WorkerEvent::Failed { .. } => "failed",
            WorkerEvent::Stalled { .. } => "stalled",
            WorkerEvent::Error { .. } => "error",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            WorkerEvent::Started { key, .. }
            | WorkerEvent::Completed { key, .. }
            | WorkerEvent::Retrying { key, .. }
            | WorkerEvent::Failed { key, .. }
            | WorkerEvent::Stalled { key, .. } => Some(key),
            WorkerEvent::Error { .. } => None,
        }
    }
}

/// Fan-out of [`WorkerEvent`]s to any number of observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.tx.subscribe()
    }

    /// Silently drops the event when nobody is listening.
    pub fn emit(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
