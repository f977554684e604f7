//! LogBroadcaster - publishes transform updates through tracing

use contracts::{TransformObserver, TransformUpdate};
use observability::metrics as playback_metrics;
use tracing::{debug, info};

/// Observer that logs every transform tree mutation
///
/// Static edges are logged at info, dynamic samples at debug.
pub struct LogBroadcaster {
    name: String,
    published: u64,
}

impl LogBroadcaster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: 0,
        }
    }

    /// Updates logged so far
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl TransformObserver for LogBroadcaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_update(&mut self, update: &TransformUpdate) {
        let t = update.transform.translation();
        match update.stamp {
            None => info!(
                broadcaster = %self.name,
                child = %update.child,
                parent = %update.parent,
                x = t.x,
                y = t.y,
                z = t.z,
                yaw = update.transform.yaw(),
                "static transform"
            ),
            Some(stamp) => debug!(
                broadcaster = %self.name,
                child = %update.child,
                parent = %update.parent,
                stamp,
                x = t.x,
                y = t.y,
                z = t.z,
                yaw = update.transform.yaw(),
                "transform"
            ),
        }
        self.published += 1;
        playback_metrics::record_transform_broadcast(&self.name, true);
    }
}
