//! Spin - Sync Engine output
//!
//! One complete lidar rotation, before and after transformation.

use serde::{Deserialize, Serialize};

use crate::{FiringBlock, FrameId, RigidTransform};

/// Single lidar return
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpinPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u8,
    /// Laser index within the firing block
    pub laser: u16,
    /// Capture time (seconds)
    pub timestamp: f64,
}

/// Complete rotation in the sensor frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spin {
    /// Frame the points are expressed in
    pub sensor_frame: FrameId,

    /// Capture time of the first point (seconds)
    pub start: f64,

    /// Capture time of the last point (seconds)
    pub end: f64,

    pub points: Vec<SpinPoint>,
}

impl Spin {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Which global chain source produced a transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationMode {
    /// Chain integrated from raw pose samples
    #[default]
    DeadReckoning,
    /// Chain taken from corrected localization samples
    Corrected,
}

impl LocalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadReckoning => "dead_reckoning",
            Self::Corrected => "corrected",
        }
    }
}

/// Spin resolved into the target frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedSpin {
    /// Emission sequence number (monotonically increasing per session)
    pub sequence: u64,

    /// Frame the raw points were captured in
    pub sensor_frame: FrameId,

    /// Frame the points are expressed in
    pub target_frame: FrameId,

    pub start: f64,

    /// Time at which every transform of this spin was resolved
    pub end: f64,

    /// Points in `target_frame`
    pub points: Vec<SpinPoint>,

    /// Transform applied to the raw points
    pub sensor_to_target: RigidTransform,

    /// Pose of the smooth frame in utm at `end`
    pub global: RigidTransform,

    /// Global chain source at `end`
    pub localization_mode: LocalizationMode,
}

impl TransformedSpin {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Packet to point conversion (calibration collaborator)
pub trait PointConverter: Send {
    /// Append the points of one firing block, captured at `stamp`, to `out`
    fn convert_block(&self, stamp: f64, block: &FiringBlock, out: &mut Vec<SpinPoint>);
}
