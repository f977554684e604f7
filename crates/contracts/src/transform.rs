//! Rigid transforms between named frames.
//!
//! A `RigidTransform` attached to an edge `child -> parent` maps coordinates
//! expressed in the child frame into the parent frame.

use std::ops::Mul;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::{FrameId, Vector3};

/// Translation + rotation between two frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform(Isometry3<f64>);

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    /// Build from a translation and roll/pitch/yaw (radians)
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self(Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        ))
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::from_xyz_rpy(x, y, z, 0.0, 0.0, 0.0)
    }

    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self(iso)
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.0
    }

    pub fn translation(&self) -> Vector3 {
        let t = &self.0.translation.vector;
        Vector3::new(t.x, t.y, t.z)
    }

    /// Roll, pitch, yaw (radians)
    pub fn rpy(&self) -> (f64, f64, f64) {
        self.0.rotation.euler_angles()
    }

    pub fn yaw(&self) -> f64 {
        self.rpy().2
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Map a point from the child frame into the parent frame
    pub fn apply(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let p = self.0.transform_point(&Point3::new(x, y, z));
        (p.x, p.y, p.z)
    }

    /// Linear interpolation of the translation and spherical interpolation
    /// of the rotation; `ratio` 0 yields `self`, 1 yields `other`.
    pub fn interpolate(&self, other: &Self, ratio: f64) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        let a = &self.0.translation.vector;
        let b = &other.0.translation.vector;
        let translation = a + (b - a) * ratio;
        let rotation = self
            .0
            .rotation
            .try_slerp(&other.0.rotation, ratio, 1e-9)
            .unwrap_or(self.0.rotation);
        Self(Isometry3::from_parts(Translation3::from(translation), rotation))
    }

    /// Approximate equality, used by tests and change detection
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        let dt = (self.0.translation.vector - other.0.translation.vector).norm();
        let dr = self.0.rotation.angle_to(&other.0.rotation);
        dt <= eps && dr <= eps
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        RigidTransform(self.0 * rhs.0)
    }
}

/// Fixed `child -> parent` relationship (sensor mounting, robot links)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub child: FrameId,
    pub parent: FrameId,
    pub transform: RigidTransform,
}

impl StaticTransform {
    pub fn new(
        child: impl Into<FrameId>,
        parent: impl Into<FrameId>,
        transform: RigidTransform,
    ) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
            transform,
        }
    }
}

/// A mutation applied to a transform tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    pub child: FrameId,
    pub parent: FrameId,
    pub transform: RigidTransform,
    /// `None` for static edges
    pub stamp: Option<f64>,
}

impl TransformUpdate {
    pub fn is_static(&self) -> bool {
        self.stamp.is_none()
    }
}

/// Synchronous hook invoked after every successful transform tree mutation.
///
/// Implementations must return promptly; anything that may block (network,
/// slow consumers) has to be handed off without waiting.
pub trait TransformObserver: Send {
    /// Observer name (used for logging/metrics)
    fn name(&self) -> &str;

    fn on_update(&mut self, update: &TransformUpdate);
}
