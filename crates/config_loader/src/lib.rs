//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON playback configuration files
//! - Validate configuration legality
//! - Generate `PlaybackBlueprint`
//! - Load the robot description and lidar calibration collaborators
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("playback.toml")).unwrap();
//! println!("Logs: {}", blueprint.playback.logs.len());
//! ```

mod calibration;
mod parser;
mod robot_model;
mod validator;

pub use calibration::{CalibrationResolver, LaserCorrection, LidarCalibration, CALIBRATION_PARAM};
pub use contracts::PlaybackBlueprint;
pub use parser::ConfigFormat;
pub use robot_model::{Joint, JointType, RobotModel};

use contracts::PlaybackError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<PlaybackBlueprint, PlaybackError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PlaybackBlueprint, PlaybackError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already built blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &PlaybackBlueprint) -> Result<(), PlaybackError> {
        validator::validate(blueprint)
    }

    /// Serialize PlaybackBlueprint to TOML string
    pub fn to_toml(blueprint: &PlaybackBlueprint) -> Result<String, PlaybackError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| PlaybackError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize PlaybackBlueprint to JSON string
    pub fn to_json(blueprint: &PlaybackBlueprint) -> Result<String, PlaybackError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| PlaybackError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, PlaybackError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            PlaybackError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            PlaybackError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, PlaybackError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PlaybackBlueprint, PlaybackError> {
        let blueprint: PlaybackBlueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}
