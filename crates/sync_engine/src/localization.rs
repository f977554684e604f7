//! Global chain source: utm -> local_utm -> smooth
//!
//! Two modes. Dead reckoning integrates raw pose samples; corrected mode
//! follows corrected localization output. The first corrected sample moves
//! the source into corrected mode for the rest of the session.

use std::collections::VecDeque;
use std::f64::consts::PI;

use contracts::{
    CorrectedPose, LocalizationConfig, LocalizationMode, PlaybackError, PoseSample,
    RigidTransform, Vector3, SMOOTH_FRAME, UTM_FRAME,
};
use tracing::{debug, info};

/// One global chain sample, ready to be written into a transform tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalChain {
    pub stamp: f64,
    /// Pose of local_utm in utm
    pub utm_to_local_utm: RigidTransform,
    /// Pose of smooth in local_utm
    pub local_utm_to_smooth: RigidTransform,
}

impl GlobalChain {
    /// Pose of smooth in utm
    pub fn utm_to_smooth(&self) -> RigidTransform {
        self.utm_to_local_utm * self.local_utm_to_smooth
    }
}

/// Result of ingesting a corrected sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedIngest {
    /// True for the sample that ended dead reckoning
    pub switched: bool,
    pub chain: GlobalChain,
}

/// Time-ordered utm->smooth samples bounded by a cache duration
#[derive(Debug, Clone, Default)]
struct ChainHistory {
    samples: VecDeque<(f64, RigidTransform)>,
}

impl ChainHistory {
    fn latest_stamp(&self) -> Option<f64> {
        self.samples.back().map(|(t, _)| *t)
    }

    fn earliest_stamp(&self) -> Option<f64> {
        self.samples.front().map(|(t, _)| *t)
    }

    fn push(&mut self, stamp: f64, transform: RigidTransform, cache_duration: f64) {
        if self.latest_stamp() == Some(stamp) {
            self.samples.pop_back();
        }
        self.samples.push_back((stamp, transform));
        let horizon = stamp - cache_duration;
        while self.samples.len() > 1 && self.samples.front().is_some_and(|(t, _)| *t < horizon) {
            self.samples.pop_front();
        }
    }

    /// Interpolate between bracketing samples, else hold the latest sample
    /// at or before `time`
    fn resolve(&self, time: f64) -> Option<RigidTransform> {
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            return None;
        }
        let (t0, before) = self.samples[idx - 1];
        match self.samples.get(idx) {
            Some(&(t1, after)) if t0 < time => {
                Some(before.interpolate(&after, (time - t0) / (t1 - t0)))
            }
            _ => Some(before),
        }
    }
}

/// Dead-reckoning integrator
///
/// Anchors local_utm at the first survey position snapped to a grid and
/// tracks the smooth -> utm offset as an exponentially smoothed estimate.
#[derive(Debug, Clone)]
struct DeadReckoning {
    origin: Option<Vector3>,
    offset: Option<(Vector3, f64)>,
    grid: f64,
    smoothing: f64,
}

impl DeadReckoning {
    fn new(config: &LocalizationConfig) -> Self {
        Self {
            origin: None,
            offset: None,
            grid: config.local_utm_grid_m,
            smoothing: config.offset_smoothing.clamp(f64::EPSILON, 1.0),
        }
    }

    fn integrate(&mut self, stamp: f64, pose: &PoseSample) -> GlobalChain {
        let grid = self.grid;
        let origin = *self.origin.get_or_insert_with(|| {
            let origin = Vector3::new(snap(pose.utm.x, grid), snap(pose.utm.y, grid), 0.0);
            info!(x = origin.x, y = origin.y, "local utm origin anchored");
            origin
        });

        // Offset that maps this pose's smooth position onto its survey position.
        let yaw = wrap_angle(pose.utm_yaw - pose.yaw);
        let rotated = RigidTransform::from_xyz_rpy(0.0, 0.0, 0.0, 0.0, 0.0, yaw)
            .apply(pose.smooth.x, pose.smooth.y, pose.smooth.z);
        let measured = Vector3::new(
            pose.utm.x - origin.x - rotated.0,
            pose.utm.y - origin.y - rotated.1,
            pose.utm.z - origin.z - rotated.2,
        );

        let (translation, yaw) = match self.offset {
            None => (measured, yaw),
            Some((prev, prev_yaw)) => {
                let a = self.smoothing;
                (
                    Vector3::new(
                        prev.x + a * (measured.x - prev.x),
                        prev.y + a * (measured.y - prev.y),
                        prev.z + a * (measured.z - prev.z),
                    ),
                    wrap_angle(prev_yaw + a * wrap_angle(yaw - prev_yaw)),
                )
            }
        };
        self.offset = Some((translation, yaw));

        GlobalChain {
            stamp,
            utm_to_local_utm: RigidTransform::from_translation(origin.x, origin.y, origin.z),
            local_utm_to_smooth: RigidTransform::from_xyz_rpy(
                translation.x,
                translation.y,
                translation.z,
                0.0,
                0.0,
                yaw,
            ),
        }
    }
}

#[derive(Debug, Clone)]
enum Mode {
    DeadReckoning {
        integrator: DeadReckoning,
        history: ChainHistory,
    },
    Corrected {
        origin: Option<Vector3>,
        history: ChainHistory,
    },
}

/// Dual-mode supplier of the utm -> smooth chain
#[derive(Debug, Clone)]
pub struct LocalizationSource {
    config: LocalizationConfig,
    cache_duration: f64,
    mode: Mode,
}

impl LocalizationSource {
    pub fn new(config: LocalizationConfig, cache_duration: f64) -> Self {
        let mode = Self::initial_mode(&config);
        Self {
            config,
            cache_duration,
            mode,
        }
    }

    fn initial_mode(config: &LocalizationConfig) -> Mode {
        if config.corrected_only {
            Mode::Corrected {
                origin: None,
                history: ChainHistory::default(),
            }
        } else {
            Mode::DeadReckoning {
                integrator: DeadReckoning::new(config),
                history: ChainHistory::default(),
            }
        }
    }

    /// Back to the configured initial mode with no samples
    pub fn reset(&mut self) {
        self.mode = Self::initial_mode(&self.config);
    }

    pub fn mode(&self) -> LocalizationMode {
        match self.mode {
            Mode::DeadReckoning { .. } => LocalizationMode::DeadReckoning,
            Mode::Corrected { .. } => LocalizationMode::Corrected,
        }
    }

    /// Whether any chain sample has been produced in the current mode
    pub fn is_initialized(&self) -> bool {
        !self.history().samples.is_empty()
    }

    /// Feed a raw pose sample
    ///
    /// Returns the new chain sample in dead-reckoning mode. In corrected
    /// mode, or for a sample older than the latest one, nothing changes.
    pub fn ingest_pose(&mut self, stamp: f64, pose: &PoseSample) -> Option<GlobalChain> {
        let cache_duration = self.cache_duration;
        match &mut self.mode {
            Mode::DeadReckoning {
                integrator,
                history,
            } => {
                if history.latest_stamp().is_some_and(|latest| stamp < latest) {
                    debug!(stamp, "pose older than latest chain sample ignored");
                    return None;
                }
                let chain = integrator.integrate(stamp, pose);
                history.push(stamp, chain.utm_to_smooth(), cache_duration);
                Some(chain)
            }
            Mode::Corrected { .. } => None,
        }
    }

    /// Feed a corrected localization sample
    ///
    /// The first one switches the source to corrected mode for good and
    /// drops all dead-reckoning state.
    ///
    /// # Errors
    /// `StaleUpdate` if `stamp` is older than the latest corrected sample.
    pub fn ingest_corrected(
        &mut self,
        stamp: f64,
        corrected: &CorrectedPose,
    ) -> Result<CorrectedIngest, PlaybackError> {
        let grid = self.config.local_utm_grid_m;
        let cache_duration = self.cache_duration;

        match &mut self.mode {
            Mode::Corrected { origin, history } => {
                let chain =
                    corrected_chain(origin, history, stamp, corrected, grid, cache_duration)?;
                Ok(CorrectedIngest {
                    switched: false,
                    chain,
                })
            }
            Mode::DeadReckoning { .. } => {
                info!(stamp, "corrected localization available, leaving dead reckoning");
                let mut origin = None;
                let mut history = ChainHistory::default();
                let chain = corrected_chain(
                    &mut origin,
                    &mut history,
                    stamp,
                    corrected,
                    grid,
                    cache_duration,
                )?;
                self.mode = Mode::Corrected { origin, history };
                Ok(CorrectedIngest {
                    switched: true,
                    chain,
                })
            }
        }
    }

    /// Pose of the smooth frame in utm at `time`
    ///
    /// Interpolated between bracketing samples, or held from the latest
    /// sample at or before `time`; `None` if there is no such sample.
    pub fn resolve(&self, time: f64) -> Option<RigidTransform> {
        self.history().resolve(time)
    }

    /// Earliest chain sample still held
    pub fn earliest_stamp(&self) -> Option<f64> {
        self.history().earliest_stamp()
    }

    pub fn latest_stamp(&self) -> Option<f64> {
        self.history().latest_stamp()
    }

    fn history(&self) -> &ChainHistory {
        match &self.mode {
            Mode::DeadReckoning { history, .. } | Mode::Corrected { history, .. } => history,
        }
    }
}

fn corrected_chain(
    origin: &mut Option<Vector3>,
    history: &mut ChainHistory,
    stamp: f64,
    corrected: &CorrectedPose,
    grid: f64,
    cache_duration: f64,
) -> Result<GlobalChain, PlaybackError> {
    if let Some(latest) = history.latest_stamp() {
        if stamp < latest {
            return Err(PlaybackError::StaleUpdate {
                child: SMOOTH_FRAME.to_string(),
                parent: UTM_FRAME.to_string(),
                stamp,
                latest,
            });
        }
    }

    let offset = corrected.offset;
    let origin =
        *origin.get_or_insert_with(|| Vector3::new(snap(offset.x, grid), snap(offset.y, grid), 0.0));

    let chain = GlobalChain {
        stamp,
        utm_to_local_utm: RigidTransform::from_translation(origin.x, origin.y, origin.z),
        local_utm_to_smooth: RigidTransform::from_xyz_rpy(
            offset.x - origin.x,
            offset.y - origin.y,
            offset.z - origin.z,
            0.0,
            0.0,
            corrected.yaw_offset,
        ),
    };
    history.push(stamp, chain.utm_to_smooth(), cache_duration);
    Ok(chain)
}

fn snap(value: f64, grid: f64) -> f64 {
    if grid > 0.0 {
        (value / grid).floor() * grid
    } else {
        value
    }
}

fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f64, utm_x: f64) -> PoseSample {
        PoseSample {
            smooth: Vector3::new(x, 0.0, 0.0),
            utm: Vector3::new(utm_x, 5_000_250.0, 0.0),
            ..Default::default()
        }
    }

    fn corrected(x: f64) -> CorrectedPose {
        CorrectedPose {
            offset: Vector3::new(x, 4_000_100.0, 0.0),
            ..Default::default()
        }
    }

    fn source() -> LocalizationSource {
        LocalizationSource::new(LocalizationConfig::default(), 10.0)
    }

    #[test]
    fn test_uninitialized_until_first_pose() {
        let mut loc = source();
        assert!(!loc.is_initialized());
        assert!(loc.resolve(0.0).is_none());

        loc.ingest_pose(1.0, &pose(0.0, 500_100.0)).unwrap();
        assert!(loc.is_initialized());
        assert!(loc.resolve(0.5).is_none());
        assert!(loc.resolve(1.0).is_some());
    }

    #[test]
    fn test_dead_reckoning_chain_maps_smooth_onto_utm() {
        let mut loc = source();
        let chain = loc.ingest_pose(0.0, &pose(2.0, 500_123.0)).unwrap();

        let origin = chain.utm_to_local_utm.translation();
        assert_eq!(origin.x, 500_000.0);
        assert_eq!(origin.y, 5_000_000.0);

        let (x, y, _) = chain.utm_to_smooth().apply(2.0, 0.0, 0.0);
        assert!((x - 500_123.0).abs() < 1e-6);
        assert!((y - 5_000_250.0).abs() < 1e-6);
    }

    #[test]
    fn test_origin_fixed_after_first_pose() {
        let mut loc = source();
        let first = loc.ingest_pose(0.0, &pose(0.0, 500_999.0)).unwrap();
        let second = loc.ingest_pose(1.0, &pose(5.0, 501_004.0)).unwrap();
        assert_eq!(first.utm_to_local_utm, second.utm_to_local_utm);
    }

    #[test]
    fn test_offset_smoothing() {
        let config = LocalizationConfig {
            offset_smoothing: 0.5,
            ..Default::default()
        };
        let mut loc = LocalizationSource::new(config, 10.0);
        loc.ingest_pose(0.0, &pose(0.0, 500_100.0)).unwrap();
        let chain = loc.ingest_pose(1.0, &pose(0.0, 500_110.0)).unwrap();

        // Half way between the two measured offsets
        let offset = chain.local_utm_to_smooth.translation();
        assert!((offset.x - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_interpolates_and_holds() {
        let mut loc = source();
        loc.ingest_pose(0.0, &pose(0.0, 500_100.0)).unwrap();
        loc.ingest_pose(1.0, &pose(0.0, 500_110.0)).unwrap();

        let mid = loc.resolve(0.5).unwrap();
        assert!((mid.apply(0.0, 0.0, 0.0).0 - 500_105.0).abs() < 1e-6);

        let held = loc.resolve(3.0).unwrap();
        assert!((held.apply(0.0, 0.0, 0.0).0 - 500_110.0).abs() < 1e-6);
    }

    #[test]
    fn test_stale_pose_ignored() {
        let mut loc = source();
        loc.ingest_pose(2.0, &pose(0.0, 500_100.0)).unwrap();
        assert!(loc.ingest_pose(1.0, &pose(0.0, 500_100.0)).is_none());
        assert_eq!(loc.latest_stamp(), Some(2.0));
    }

    #[test]
    fn test_switch_is_irrevocable() {
        let mut loc = source();
        for t in 0..5 {
            loc.ingest_pose(t as f64, &pose(t as f64, 500_100.0 + t as f64))
                .unwrap();
        }
        assert_eq!(loc.mode(), LocalizationMode::DeadReckoning);

        let ingest = loc.ingest_corrected(5.0, &corrected(300_000.0)).unwrap();
        assert!(ingest.switched);
        assert_eq!(loc.mode(), LocalizationMode::Corrected);

        // Dead-reckoning history is gone
        assert!(loc.resolve(3.0).is_none());
        assert_eq!(loc.earliest_stamp(), Some(5.0));

        // Poses no longer move the chain
        assert!(loc.ingest_pose(6.0, &pose(6.0, 900_000.0)).is_none());
        assert_eq!(loc.mode(), LocalizationMode::Corrected);
        let held = loc.resolve(6.0).unwrap();
        assert!((held.apply(0.0, 0.0, 0.0).0 - 300_000.0).abs() < 1e-6);

        let again = loc.ingest_corrected(7.0, &corrected(300_010.0)).unwrap();
        assert!(!again.switched);
    }

    #[test]
    fn test_corrected_chain_and_stale_rejection() {
        let mut loc = source();
        let ingest = loc.ingest_corrected(1.0, &corrected(300_123.0)).unwrap();
        assert_eq!(ingest.chain.utm_to_local_utm.translation().x, 300_000.0);
        assert!((ingest.chain.local_utm_to_smooth.translation().x - 123.0).abs() < 1e-9);

        let err = loc.ingest_corrected(0.5, &corrected(1.0)).unwrap_err();
        assert!(matches!(err, PlaybackError::StaleUpdate { .. }));
        assert_eq!(loc.latest_stamp(), Some(1.0));
    }

    #[test]
    fn test_corrected_only_ignores_poses() {
        let config = LocalizationConfig {
            corrected_only: true,
            ..Default::default()
        };
        let mut loc = LocalizationSource::new(config, 10.0);
        assert_eq!(loc.mode(), LocalizationMode::Corrected);
        assert!(loc.ingest_pose(0.0, &pose(0.0, 500_100.0)).is_none());
        assert!(!loc.is_initialized());

        let ingest = loc.ingest_corrected(1.0, &corrected(300_000.0)).unwrap();
        assert!(!ingest.switched);
        assert!(loc.is_initialized());
    }

    #[test]
    fn test_reset_returns_to_initial_mode() {
        let mut loc = source();
        loc.ingest_corrected(1.0, &corrected(300_000.0)).unwrap();
        loc.reset();
        assert_eq!(loc.mode(), LocalizationMode::DeadReckoning);
        assert!(!loc.is_initialized());
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-0.5) + 0.5).abs() < 1e-12);
    }
}
