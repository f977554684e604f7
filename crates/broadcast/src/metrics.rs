//! Broadcaster counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between a broadcaster and its worker
#[derive(Debug, Default)]
pub struct BroadcastMetrics {
    /// Updates waiting in the channel
    queue_len: AtomicUsize,
    /// Updates accepted by the channel
    sent_count: AtomicU64,
    /// Updates handed to the downstream observer
    forwarded_count: AtomicU64,
    /// Updates dropped because the channel was full or closed
    dropped_count: AtomicU64,
}

impl BroadcastMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub fn inc_sent_count(&self) {
        self.sent_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarded_count(&self) -> u64 {
        self.forwarded_count.load(Ordering::Relaxed)
    }

    pub fn inc_forwarded_count(&self) {
        self.forwarded_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            sent_count: self.sent_count(),
            forwarded_count: self.forwarded_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of broadcaster counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub sent_count: u64,
    pub forwarded_count: u64,
    pub dropped_count: u64,
}
