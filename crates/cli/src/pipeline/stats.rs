//! Session statistics.

use std::time::Duration;

use observability::PlaybackMetricsAggregator;
use sync_engine::SyncStats;

/// Statistics from a playback run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Spins handed to the output
    pub spins_emitted: u64,

    /// Points across all emitted spins
    pub points: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Stopped by a shutdown signal
    pub interrupted: bool,

    /// Updates the channel broadcaster forwarded (None without one)
    pub transforms_forwarded: Option<u64>,

    /// Synchronizer counters
    pub sync: SyncStats,

    /// Emitted spin aggregation
    pub metrics: PlaybackMetricsAggregator,
}

impl SessionStats {
    /// Spins per wall-clock second
    pub fn spins_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.spins_emitted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of assembled spins that were discarded, in percent
    pub fn discard_rate(&self) -> f64 {
        let total = self.sync.spins_emitted + self.sync.spins_discarded;
        if total > 0 {
            (self.sync.spins_discarded as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Playback Statistics ===\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Spins emitted: {}", self.spins_emitted);
        println!("   ├─ Points: {}", self.points);
        println!("   ├─ Spins/s: {:.2}", self.spins_per_sec());
        match self.transforms_forwarded {
            Some(forwarded) => println!("   ├─ Transforms broadcast: {}", forwarded),
            None => println!("   ├─ Transforms broadcast: (channel disabled)"),
        }
        println!("   └─ Interrupted: {}", self.interrupted);

        let sync = &self.sync;
        println!("\nSynchronizer");
        println!("   ├─ Records read: {}", sync.records);
        println!(
            "   ├─ Poses: {} (corrected: {})",
            sync.poses, sync.corrected_poses
        );
        println!(
            "   ├─ Packet batches: {} (other lidars: {})",
            sync.packet_batches, sync.foreign_batches
        );
        println!("   ├─ Spins assembled: {}", sync.spins_assembled);
        println!(
            "   ├─ Spins discarded: {} ({:.2}%)",
            sync.spins_discarded,
            self.discard_rate()
        );
        println!("   ├─ Degenerate rotations: {}", sync.spins_degenerate);
        println!("   └─ Stale updates: {}", sync.stale_updates);

        println!("\n{}", self.metrics.summary());
    }
}
