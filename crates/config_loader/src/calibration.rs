//! Lidar calibration
//!
//! Per-laser correction table turning raw firing blocks into sensor-frame
//! points. Ranges are meters before `distance_scale`; angles are degrees.
//!
//! ```toml
//! model = "hdl32"
//! min_range = 0.9
//! max_range = 100.0
//!
//! [[lasers]]
//! elevation_deg = -30.67
//!
//! [[lasers]]
//! elevation_deg = -9.33
//! azimuth_offset_deg = 0.5
//! distance_offset_m = 0.02
//! ```

use std::path::Path;

use contracts::{FiringBlock, ParameterStore, PlaybackError, PointConverter, SpinPoint};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::parser::{self, ConfigFormat};

/// Parameter store key consulted when no calibration file is given
pub const CALIBRATION_PARAM: &str = "lidar_calibration";

/// Correction of a single laser
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserCorrection {
    pub elevation_deg: f64,
    #[serde(default)]
    pub azimuth_offset_deg: f64,
    #[serde(default)]
    pub distance_offset_m: f64,
}

/// Calibration table of one lidar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LidarCalibration {
    #[serde(default)]
    pub model: String,

    /// Raw range to meters
    #[serde(default = "default_distance_scale")]
    pub distance_scale: f64,

    /// Returns closer than this are discarded (m)
    #[serde(default)]
    pub min_range: f64,

    /// Returns farther than this are discarded (m)
    #[serde(default = "default_max_range")]
    pub max_range: f64,

    /// Indexed by laser number within a firing block
    pub lasers: Vec<LaserCorrection>,
}

fn default_distance_scale() -> f64 {
    1.0
}

fn default_max_range() -> f64 {
    200.0
}

impl LidarCalibration {
    /// Load a calibration file (.toml / .json)
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
                    "calibration {}: unsupported format",
                    path.display()
                ))
            })?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlaybackError::configuration(format!("calibration {}: {e}", path.display()))
        })?;

        Self::parse(&content, format)
            .map_err(|e| PlaybackError::configuration(format!("calibration {}: {e}", path.display())))
    }

    fn parse(content: &str, format: ConfigFormat) -> Result<Self, PlaybackError> {
        let calibration: Self = parser::parse(content, format)?;
        calibration.check()?;
        Ok(calibration)
    }

    fn check(&self) -> Result<(), PlaybackError> {
        if self.lasers.is_empty() {
            return Err(PlaybackError::configuration("calibration has no lasers"));
        }
        if !(self.distance_scale > 0.0) {
            return Err(PlaybackError::configuration(format!(
                "distance_scale must be > 0, got {}",
                self.distance_scale
            )));
        }
        if !(self.min_range >= 0.0 && self.min_range < self.max_range) {
            return Err(PlaybackError::configuration(format!(
                "invalid range window [{}, {}]",
                self.min_range, self.max_range
            )));
        }
        if let Some(laser) = self
            .lasers
            .iter()
            .position(|c| !c.elevation_deg.is_finite() || c.elevation_deg.abs() > 90.0)
        {
            return Err(PlaybackError::configuration(format!(
                "laser {laser}: elevation out of range"
            )));
        }
        Ok(())
    }

    pub fn laser_count(&self) -> usize {
        self.lasers.len()
    }
}

impl PointConverter for LidarCalibration {
    fn convert_block(&self, stamp: f64, block: &FiringBlock, out: &mut Vec<SpinPoint>) {
        for (laser, (range, correction)) in block.ranges.iter().zip(&self.lasers).enumerate() {
            // Zero range means no return
            if *range <= 0.0 {
                continue;
            }
            let distance =
                f64::from(*range) * self.distance_scale + correction.distance_offset_m;
            if distance < self.min_range || distance > self.max_range {
                continue;
            }

            // Azimuth runs clockwise seen from above, x forward
            let azimuth = (block.azimuth_deg + correction.azimuth_offset_deg).to_radians();
            let elevation = correction.elevation_deg.to_radians();
            let planar = distance * elevation.cos();

            out.push(SpinPoint {
                x: planar * azimuth.cos(),
                y: -planar * azimuth.sin(),
                z: distance * elevation.sin(),
                intensity: block.intensities.get(laser).copied().unwrap_or(0),
                laser: laser as u16,
                timestamp: stamp,
            });
        }
    }
}

/// Locates the calibration of a playback session
pub struct CalibrationResolver;

impl CalibrationResolver {
    /// Explicit path first, then the path stored under [`CALIBRATION_PARAM`]
    ///
    /// # Errors
    /// `Configuration` when neither is set or the file cannot be loaded.
    pub fn resolve(
        explicit: Option<&Path>,
        store: &dyn ParameterStore,
    ) -> Result<LidarCalibration, PlaybackError> {
        let (path, origin) = match explicit {
            Some(path) => (path.to_path_buf(), "option"),
            None => match store.get(CALIBRATION_PARAM) {
                Some(value) => (value.into(), "parameter"),
                None => {
                    return Err(PlaybackError::configuration(format!(
                        "no lidar calibration: pass a calibration file or set '{CALIBRATION_PARAM}'"
                    )))
                }
            },
        };

        let calibration = LidarCalibration::from_file(&path)?;
        info!(
            path = %path.display(),
            origin,
            model = %calibration.model,
            lasers = calibration.laser_count(),
            "lidar calibration loaded"
        );
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MapParameterStore;
    use std::io::Write;

    const TABLE: &str = r#"
model = "test2"
min_range = 1.0
max_range = 50.0

[[lasers]]
elevation_deg = 0.0

[[lasers]]
elevation_deg = 30.0
distance_offset_m = 0.5
"#;

    fn write_table(content: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn block(azimuth_deg: f64, ranges: Vec<f32>) -> FiringBlock {
        FiringBlock {
            azimuth_deg,
            intensities: vec![7; ranges.len()],
            ranges,
        }
    }

    #[test]
    fn test_convert_block_geometry() {
        let file = write_table(TABLE, ".toml");
        let calibration = LidarCalibration::from_file(file.path()).unwrap();
        assert_eq!(calibration.laser_count(), 2);

        let mut points = Vec::new();
        calibration.convert_block(3.0, &block(90.0, vec![10.0, 9.5]), &mut points);
        assert_eq!(points.len(), 2);

        // Laser 0: horizontal, azimuth 90 deg clockwise -> -y
        let p = points[0];
        assert!(p.x.abs() < 1e-9);
        assert!((p.y + 10.0).abs() < 1e-9);
        assert!(p.z.abs() < 1e-9);
        assert_eq!((p.laser, p.intensity, p.timestamp), (0, 7, 3.0));

        // Laser 1: 10 m after offset, 30 deg up
        let p = points[1];
        assert!((p.z - 5.0).abs() < 1e-9);
        assert_eq!(p.laser, 1);
    }

    #[test]
    fn test_range_window_and_missing_returns() {
        let file = write_table(TABLE, ".toml");
        let calibration = LidarCalibration::from_file(file.path()).unwrap();

        let mut points = Vec::new();
        // No return, too close; third range has no laser entry
        calibration.convert_block(0.0, &block(0.0, vec![0.0, 0.1, 5.0]), &mut points);
        assert!(points.is_empty());

        calibration.convert_block(0.0, &block(0.0, vec![80.0, 5.0]), &mut points);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].laser, 1);
    }

    #[test]
    fn test_invalid_tables_rejected() {
        let empty = write_table("model = \"x\"\nlasers = []\n", ".toml");
        assert!(matches!(
            LidarCalibration::from_file(empty.path()).unwrap_err(),
            PlaybackError::Configuration { .. }
        ));

        let bad_window = write_table(
            r#"{"min_range": 5.0, "max_range": 1.0, "lasers": [{"elevation_deg": 0.0}]}"#,
            ".json",
        );
        let err = LidarCalibration::from_file(bad_window.path()).unwrap_err();
        assert!(err.to_string().contains("range window"), "got: {err}");

        let bad_elevation = write_table("[[lasers]]\nelevation_deg = 120.0\n", ".toml");
        assert!(LidarCalibration::from_file(bad_elevation.path()).is_err());
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let explicit = write_table(TABLE, ".toml");
        let other = write_table("model = \"other\"\n[[lasers]]\nelevation_deg = 0.0\n", ".toml");
        let store = MapParameterStore::new().with(
            CALIBRATION_PARAM,
            other.path().to_string_lossy().to_string(),
        );

        let calibration = CalibrationResolver::resolve(Some(explicit.path()), &store).unwrap();
        assert_eq!(calibration.model, "test2");

        let calibration = CalibrationResolver::resolve(None, &store).unwrap();
        assert_eq!(calibration.model, "other");
    }

    #[test]
    fn test_resolve_without_source_fails() {
        let err = CalibrationResolver::resolve(None, &MapParameterStore::new()).unwrap_err();
        assert!(matches!(err, PlaybackError::Configuration { .. }));
        assert!(err.to_string().contains(CALIBRATION_PARAM));
    }

    #[test]
    fn test_resolve_missing_file_fails() {
        let err = CalibrationResolver::resolve(
            Some(Path::new("/nonexistent/calibration.toml")),
            &MapParameterStore::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PlaybackError::Configuration { .. }));
    }
}
