//! Robot description (kinematic model)
//!
//! A flattened joint list, TOML or JSON:
//!
//! ```toml
//! name = "ego"
//!
//! [[joints]]
//! name = "vehicle_to_velodyne"
//! parent = "vehicle"
//! child = "velodyne"
//! xyz = [1.2, 0.0, 1.8]
//! rpy = [0.0, 0.0, 0.0]   # radians
//! ```
//!
//! Only fixed joints become static transforms; moving joints are skipped.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use contracts::{FrameId, ParameterStore, PlaybackError, RigidTransform, RobotConfig, StaticTransform};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::parser::{self, ConfigFormat};

/// Joint kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointType {
    #[default]
    Fixed,
    Revolute,
    Continuous,
    Prismatic,
}

/// One parent/child link relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: String,
    pub child: String,
    #[serde(default, rename = "type")]
    pub joint_type: JointType,
    #[serde(default)]
    pub xyz: [f64; 3],
    #[serde(default)]
    pub rpy: [f64; 3],
}

impl Joint {
    pub fn origin(&self) -> RigidTransform {
        let [x, y, z] = self.xyz;
        let [roll, pitch, yaw] = self.rpy;
        RigidTransform::from_xyz_rpy(x, y, z, roll, pitch, yaw)
    }
}

/// Parsed robot description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub joints: Vec<Joint>,
}

impl RobotModel {
    /// Load a description file (.toml / .json)
    ///
    /// # Errors
    /// `Configuration` when the file is missing, malformed or inconsistent.
    pub fn from_file(path: &Path) -> Result<Self, PlaybackError> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ConfigFormat::from_extension)
            .ok_or_else(|| {
                PlaybackError::configuration(format!(
                    "robot description {}: unsupported format",
                    path.display()
                ))
            })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlaybackError::configuration(format!(
                "robot description {}: {e}",
                path.display()
            ))
        })?;

        let model = Self::parse(&content, format)
            .map_err(|e| PlaybackError::configuration(format!("robot description {}: {e}", path.display())))?;
        info!(path = %path.display(), robot = %model.name, joints = model.joints.len(), "robot description loaded");
        Ok(model)
    }

    /// Load the description text stored under `key`
    ///
    /// # Errors
    /// `Configuration` when the key is unset or the text is invalid.
    pub fn from_param(store: &dyn ParameterStore, key: &str) -> Result<Self, PlaybackError> {
        let content = store.get(key).ok_or_else(|| {
            PlaybackError::configuration(format!("robot description parameter '{key}' is not set"))
        })?;

        let model = content
            .parse::<Self>()
            .map_err(|e| PlaybackError::configuration(format!("robot description parameter '{key}': {e}")))?;
        info!(param = key, robot = %model.name, joints = model.joints.len(), "robot description loaded");
        Ok(model)
    }

    /// Resolve the configured description source: file first, then parameter
    ///
    /// `Ok(None)` when neither is configured.
    pub fn from_config(
        config: &RobotConfig,
        store: &dyn ParameterStore,
    ) -> Result<Option<Self>, PlaybackError> {
        match (&config.description, &config.param) {
            (Some(path), _) => Self::from_file(path).map(Some),
            (None, Some(key)) => Self::from_param(store, key).map(Some),
            (None, None) => Ok(None),
        }
    }

    fn parse(content: &str, format: ConfigFormat) -> Result<Self, PlaybackError> {
        let model: Self = parser::parse(content, format)?;
        model.check()?;
        Ok(model)
    }

    /// Every link has at most one parent and no joint points at itself
    fn check(&self) -> Result<(), PlaybackError> {
        let mut children = HashSet::new();
        for joint in &self.joints {
            if joint.parent.is_empty() || joint.child.is_empty() {
                return Err(PlaybackError::configuration(format!(
                    "joint '{}' has an empty link name",
                    joint.name
                )));
            }
            if joint.parent == joint.child {
                return Err(PlaybackError::configuration(format!(
                    "joint '{}' connects '{}' to itself",
                    joint.name, joint.child
                )));
            }
            if !children.insert(joint.child.as_str()) {
                return Err(PlaybackError::configuration(format!(
                    "link '{}' has more than one parent",
                    joint.child
                )));
            }
        }
        Ok(())
    }

    /// Static edges for every fixed joint
    pub fn static_transforms(&self) -> Vec<StaticTransform> {
        self.joints
            .iter()
            .filter(|joint| {
                let fixed = joint.joint_type == JointType::Fixed;
                if !fixed {
                    debug!(joint = %joint.name, kind = ?joint.joint_type, "moving joint skipped");
                }
                fixed
            })
            .map(|joint| {
                StaticTransform::new(
                    FrameId::from(&joint.child),
                    FrameId::from(&joint.parent),
                    joint.origin(),
                )
            })
            .collect()
    }
}

/// Inline description text, format guessed from the content
impl FromStr for RobotModel {
    type Err = PlaybackError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        Self::parse(content, ConfigFormat::sniff(content))
    }
}
