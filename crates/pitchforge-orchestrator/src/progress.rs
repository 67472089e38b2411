use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pitchforge_core::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

/// One progress notification for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Run the event belongs to.
    pub run_id: Uuid,
    /// Stage the run entered or is in.
    pub stage: Stage,
    /// Refinements so far.
    pub iteration: u32,
    /// Human-readable description.
    pub message: String,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event stamped with the current time.
    pub fn new(run_id: Uuid, stage: Stage, iteration: u32, message: impl Into<String>) -> Self {
        Self {
            run_id,
            stage,
            iteration,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out of progress events to any number of observers.
///
/// Each run gets its own bounded broadcast channel; a slow subscriber loses
/// the oldest events instead of stalling the pipeline.
pub struct ProgressNotifier {
    capacity: usize,
    runs: Mutex<HashMap<Uuid, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressNotifier {
    /// Notifier buffering up to `capacity` events per run.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Open the channel of `run_id` and subscribe to it. Opening an already
    /// open channel only adds a subscriber.
    pub fn open(&self, run_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        self.runs
            .lock()
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver `event` to current subscribers. Never blocks; events of runs
    /// without an open channel are dropped.
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(tx) = self.runs.lock().get(&event.run_id) {
            // No receivers is fine.
            let _ = tx.send(event);
        }
    }

    /// Subscribe to one run. `None` once the run's channel is closed.
    pub fn subscribe(&self, run_id: Uuid) -> Option<broadcast::Receiver<ProgressEvent>> {
        self.runs.lock().get(&run_id).map(broadcast::Sender::subscribe)
    }

    /// Close the channel of `run_id`. Subscribers drain what is buffered and
    /// then see the end of the stream.
    pub fn close(&self, run_id: Uuid) {
        self.runs.lock().remove(&run_id);
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Turn a run subscription into a stream that ends when the run closes.
/// Events lost to lagging are skipped with a warning.
pub fn progress_stream(
    run_id: Uuid,
    rx: broadcast::Receiver<ProgressEvent>,
) -> impl Stream<Item = ProgressEvent> {
    BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Progress subscriber lagged, events skipped");
            None
        }
    })
}
