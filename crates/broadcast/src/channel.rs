//! ChannelBroadcaster - hands transform updates to an async consumer
//!
//! The transform tree calls observers synchronously, so the broadcaster
//! never waits: updates go into a bounded channel with `try_send` and are
//! dropped (and counted) when the consumer falls behind.

use std::sync::Arc;

use contracts::{TransformObserver, TransformUpdate};
use observability::metrics as playback_metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::BroadcastMetrics;

/// Bounded, non-blocking transform publisher
pub struct ChannelBroadcaster {
    name: String,
    tx: mpsc::Sender<TransformUpdate>,
    metrics: Arc<BroadcastMetrics>,
}

impl ChannelBroadcaster {
    /// Create a broadcaster and the receiving end of its channel
    pub fn channel(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<TransformUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let broadcaster = Self {
            name: name.into(),
            tx,
            metrics: Arc::new(BroadcastMetrics::new()),
        };
        (broadcaster, rx)
    }

    /// Create a broadcaster whose updates are forwarded to `downstream`
    /// on a tokio task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<O: TransformObserver + 'static>(
        name: impl Into<String>,
        capacity: usize,
        downstream: O,
    ) -> (Self, BroadcastWorker) {
        let (broadcaster, rx) = Self::channel(name, capacity);
        let worker_metrics = Arc::clone(&broadcaster.metrics);
        let worker_name = broadcaster.name.clone();

        let handle = tokio::spawn(async move {
            forward_worker(downstream, rx, worker_metrics, worker_name).await
        });

        let worker = BroadcastWorker {
            name: broadcaster.name.clone(),
            handle,
        };
        (broadcaster, worker)
    }

    pub fn metrics(&self) -> &Arc<BroadcastMetrics> {
        &self.metrics
    }

    /// Returns true if queued, false if dropped
    pub fn try_publish(&self, update: TransformUpdate) -> bool {
        match self.tx.try_send(update) {
            Ok(()) => {
                self.metrics.inc_sent_count();
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(update)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    broadcaster = %self.name,
                    child = %update.child,
                    stamp = ?update.stamp,
                    "queue full, transform dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.inc_dropped_count();
                error!(broadcaster = %self.name, "consumer closed");
                false
            }
        }
    }
}

impl TransformObserver for ChannelBroadcaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_update(&mut self, update: &TransformUpdate) {
        let delivered = self.try_publish(update.clone());
        playback_metrics::record_transform_broadcast(&self.name, delivered);
    }
}

/// Handle to the task draining a [`ChannelBroadcaster`]
pub struct BroadcastWorker {
    name: String,
    handle: JoinHandle<u64>,
}

impl BroadcastWorker {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the worker to drain; it stops once the broadcaster is dropped.
    ///
    /// Returns the number of updates forwarded.
    #[instrument(name = "broadcast_worker_join", skip(self), fields(broadcaster = %self.name))]
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(forwarded) => forwarded,
            Err(e) => {
                error!(broadcaster = %self.name, error = ?e, "worker task panicked");
                0
            }
        }
    }
}

#[instrument(
    name = "broadcast_worker_loop",
    skip(downstream, rx, metrics),
    fields(broadcaster = %name)
)]
async fn forward_worker<O: TransformObserver>(
    mut downstream: O,
    mut rx: mpsc::Receiver<TransformUpdate>,
    metrics: Arc<BroadcastMetrics>,
    name: String,
) -> u64 {
    debug!(downstream = downstream.name(), "broadcast worker started");

    let mut forwarded = 0;
    while let Some(update) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        downstream.on_update(&update);
        metrics.inc_forwarded_count();
        forwarded += 1;
    }

    debug!(forwarded, "broadcast worker stopped");
    forwarded
}
