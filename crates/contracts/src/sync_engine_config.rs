//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};

use crate::FrameId;

/// Spin synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinSyncConfig {
    /// Lidar frame the spins are captured in
    pub sensor_frame: FrameId,

    /// Frame the spins are resolved into
    #[serde(default = "default_target_frame")]
    pub target_frame: FrameId,

    /// Spin assembly configuration
    #[serde(default)]
    pub assembler: AssemblerConfig,

    /// Global chain configuration
    #[serde(default)]
    pub localization: LocalizationConfig,

    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// How long dynamic transform samples are kept (seconds)
    #[serde(default = "default_cache_duration")]
    pub cache_duration_s: f64,
}

impl SpinSyncConfig {
    pub fn new(sensor_frame: impl Into<FrameId>) -> Self {
        Self {
            sensor_frame: sensor_frame.into(),
            target_frame: default_target_frame(),
            assembler: AssemblerConfig::default(),
            localization: LocalizationConfig::default(),
            queue: QueueConfig::default(),
            cache_duration_s: default_cache_duration(),
        }
    }
}

fn default_target_frame() -> FrameId {
    FrameId::smooth()
}

fn default_cache_duration() -> f64 {
    10.0
}

/// Rotation boundary detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Reference azimuth whose crossing closes a spin (deg)
    #[serde(default)]
    pub start_azimuth_deg: f64,

    /// Completed spins with fewer points are dropped
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Completed-spin output queue capacity
    #[serde(default = "default_assembler_capacity")]
    pub capacity: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            start_azimuth_deg: 0.0,
            min_points: default_min_points(),
            capacity: default_assembler_capacity(),
        }
    }
}

fn default_min_points() -> usize {
    1
}

fn default_assembler_capacity() -> usize {
    16
}

/// Global chain (utm -> local_utm -> smooth) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Skip dead reckoning and derive the chain from corrected samples only
    #[serde(default)]
    pub corrected_only: bool,

    /// Grid the local utm origin is snapped to (m)
    #[serde(default = "default_local_utm_grid")]
    pub local_utm_grid_m: f64,

    /// Weight of a new pose sample in the offset estimate (0, 1]; 1 disables smoothing
    #[serde(default = "default_offset_smoothing")]
    pub offset_smoothing: f64,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            corrected_only: false,
            local_utm_grid_m: default_local_utm_grid(),
            offset_smoothing: default_offset_smoothing(),
        }
    }
}

fn default_local_utm_grid() -> f64 {
    1000.0
}

fn default_offset_smoothing() -> f64 {
    1.0
}

/// Pending / history queue bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Completed spins waiting for a transform
    #[serde(default = "default_max_pending")]
    pub max_pending_spins: usize,

    /// Emitted spins kept for backward traversal
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending_spins: default_max_pending(),
            history_len: default_history_len(),
        }
    }
}

fn default_max_pending() -> usize {
    64
}

fn default_history_len() -> usize {
    16
}
