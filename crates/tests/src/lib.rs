//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 日志写入临时目录后完整回放。
//!
//! 负责：
//! - 合约快照测试
//! - 日志 -> 同步器 -> 广播器 e2e 测试
//! - 真实记录流上的定位模式切换

/// e2e 测试使用的合成行驶数据
///
/// - 位姿：0.0 到 2.0 每 0.1s 一条，车辆沿 smooth x 以 1 m/s 前进
/// - 激光雷达：每 25ms 一个包，每包一个发射块，方位角 0/90/180/270 度
/// - 每批 4 个包，批次时间戳取最后一个包
#[cfg(test)]
mod fixtures {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    use config_loader::{CalibrationResolver, ConfigFormat, ConfigLoader};
    use contracts::{
        CorrectedPose, FiringBlock, LidarPacket, LidarPacketBatch, LogRecord, MapParameterStore,
        PlaybackBlueprint, PoseSample, RecordPayload, Vector3, VehicleStatus,
    };
    use sync_engine::SpinSynchronizer;

    pub const UTM_EAST: f64 = 500_000.0;
    pub const UTM_NORTH: f64 = 4_000_000.0;
    pub const PACKET_PERIOD: f64 = 0.025;
    pub const PACKETS: usize = 60;
    pub const RANGE: f32 = 10.0;

    pub fn pose_log() -> Vec<LogRecord> {
        (0..=20)
            .map(|i| {
                let t = i as f64 * 0.1;
                LogRecord::new(
                    t,
                    RecordPayload::Pose(PoseSample {
                        smooth: Vector3::new(t, 0.0, 0.0),
                        utm: Vector3::new(UTM_EAST + t, UTM_NORTH, 0.0),
                        velocity: Vector3::new(1.0, 0.0, 0.0),
                        ..Default::default()
                    }),
                )
            })
            .collect()
    }

    pub fn lidar_log(frame: &str) -> Vec<LogRecord> {
        let packets: Vec<LidarPacket> = (0..PACKETS)
            .map(|k| LidarPacket {
                stamp: k as f64 * PACKET_PERIOD,
                blocks: vec![FiringBlock {
                    azimuth_deg: (k % 4) as f64 * 90.0,
                    ranges: vec![RANGE],
                    intensities: vec![(k % 256) as u8],
                }],
            })
            .collect();

        packets
            .chunks(4)
            .map(|chunk| {
                let stamp = chunk.last().map_or(0.0, |p| p.stamp);
                LogRecord::new(
                    stamp,
                    RecordPayload::LidarPacketBatch(LidarPacketBatch {
                        sensor_frame: frame.into(),
                        packets: chunk.to_vec(),
                    }),
                )
            })
            .collect()
    }

    /// 从 `from` 到 2.0 的校正样本，smooth 位于原点以东 10m
    pub fn corrected_log(from: usize) -> Vec<LogRecord> {
        (from..=20)
            .map(|i| {
                LogRecord::new(
                    i as f64 * 0.1,
                    RecordPayload::CorrectedPose(CorrectedPose {
                        offset: Vector3::new(UTM_EAST + 10.0, UTM_NORTH, 0.0),
                        yaw_offset: 0.0,
                        std_dev: Some(0.05),
                    }),
                )
            })
            .collect()
    }

    pub fn status_log() -> Vec<LogRecord> {
        (0..10)
            .map(|i| {
                LogRecord::new(
                    i as f64 * 0.2 + 0.01,
                    RecordPayload::VehicleStatus(VehicleStatus {
                        speed: 1.0,
                        steering_angle: 0.0,
                        autonomous: i % 2 == 0,
                    }),
                )
            })
            .collect()
    }

    pub fn write_log(dir: &Path, name: &str, records: &[LogRecord]) -> PathBuf {
        let path = dir.join(name);
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        for record in records {
            serde_json::to_writer(&mut writer, record).unwrap();
            writer.write_all(b"\n").unwrap();
        }
        writer.flush().unwrap();
        path
    }

    pub fn write_calibration(dir: &Path) -> PathBuf {
        let path = dir.join("calibration.toml");
        std::fs::write(&path, "model = \"single\"\n[[lasers]]\nelevation_deg = 0.0\n").unwrap();
        path
    }

    /// 基于 `logs` 的蓝图，传感器安装在 (1, 0, 2)
    pub fn blueprint(dir: &Path, logs: &[PathBuf], extra: &str) -> PlaybackBlueprint {
        let calibration = write_calibration(dir);
        let logs = logs
            .iter()
            .map(|p| format!("{:?}", p.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(", ");
        let content = format!(
            "[playback]\nlogs = [{logs}]\n\n\
             [lidar]\nsensor_frame = \"velodyne\"\ncalibration = {:?}\n\n\
             [lidar.mount.location]\nx = 1.0\ny = 0.0\nz = 2.0\n\n{extra}",
            calibration.to_string_lossy()
        );
        ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap()
    }

    pub fn synchronizer(blueprint: &PlaybackBlueprint) -> SpinSynchronizer<'static> {
        let calibration = CalibrationResolver::resolve(
            blueprint.lidar.calibration.as_deref(),
            &MapParameterStore::new(),
        )
        .unwrap();
        let statics = blueprint.mount_transform();
        let mut sync =
            SpinSynchronizer::new(blueprint.to_sync_config(), statics, Box::new(calibration))
                .unwrap();
        sync.load(&blueprint.playback.logs, blueprint.playback.skip_sec)
            .unwrap();
        sync
    }

    pub fn drain(sync: &mut SpinSynchronizer<'_>) -> Vec<contracts::TransformedSpin> {
        let mut spins = Vec::new();
        while sync.next_spin().unwrap() {
            spins.push(sync.get_spin().unwrap().clone());
        }
        spins
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::{LogRecord, RecordKind};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_record_wire_format() {
        let line = r#"{"timestamp":1.5,"payload":{"kind":"corrected_pose","offset":{"x":1.0,"y":2.0,"z":0.0},"yaw_offset":0.1}}"#;
        let record: LogRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.kind(), RecordKind::CorrectedPose);
        let corrected = record.as_corrected_pose().unwrap();
        assert_eq!(corrected.offset.y, 2.0);
        assert!(corrected.std_dev.is_none());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};

    use broadcast::ChannelBroadcaster;
    use contracts::{LocalizationMode, PlaybackError, TransformObserver, TransformUpdate};

    use super::fixtures::*;

    const EPS: f64 = 1e-6;

    /// Dead-reckoning playback: pose log + lidar log
    ///
    /// Verifies the whole path:
    /// 1. Both logs merge in timestamp order
    /// 2. Rotations assemble at the 0 deg crossing
    /// 3. Every point is resolved with the transforms at its spin's end
    #[test]
    fn test_e2e_dead_reckoning_playback() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
        ];
        let bp = blueprint(dir.path(), &logs, "");
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);

        // Leading fragment and trailing rotation never complete.
        assert_eq!(spins.len(), 13);
        for (i, spin) in spins.iter().enumerate() {
            let m = (i + 1) as f64;
            assert_eq!(spin.sequence, i as u64);
            assert!((spin.start - m * 0.1).abs() < EPS);
            assert!((spin.end - (m * 0.1 + 0.075)).abs() < EPS);
            assert_eq!(spin.len(), 4);
            assert_eq!(spin.localization_mode, LocalizationMode::DeadReckoning);
            assert_eq!(spin.target_frame, "smooth");

            // Sensor at (1, 0, 2) on a vehicle at smooth x = end
            for (point, azimuth) in spin.points.iter().zip([0.0f64, 90.0, 180.0, 270.0]) {
                let a = azimuth.to_radians();
                assert!((point.x - (spin.end + 1.0 + 10.0 * a.cos())).abs() < 1e-4);
                assert!((point.y + 10.0 * a.sin()).abs() < 1e-4);
                assert!((point.z - 2.0).abs() < 1e-4);
            }

            // Survey offset matches the smooth track exactly
            let global = spin.global.translation();
            assert!((global.x - UTM_EAST).abs() < 1e-3);
            assert!((global.y - UTM_NORTH).abs() < 1e-3);
        }

        let stats = sync.stats();
        assert_eq!(stats.spins_assembled, 13);
        assert_eq!(stats.spins_emitted, 13);
        assert_eq!(stats.spins_discarded, 0);
        assert_eq!(stats.poses, 21);
        assert_eq!(stats.packet_batches, 15);
        assert_eq!(stats.stale_updates, 0);
    }

    /// Corrected localization arriving mid-drive takes over the global chain
    #[test]
    fn test_e2e_switch_to_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
            write_log(dir.path(), "localization.jsonl", &corrected_log(10)),
        ];
        let bp = blueprint(dir.path(), &logs, "");
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);

        let (dr, corrected): (Vec<_>, Vec<_>) = spins
            .iter()
            .partition(|s| s.localization_mode == LocalizationMode::DeadReckoning);
        assert_eq!(dr.len(), 9);
        assert_eq!(corrected.len(), 4);
        assert!(dr.iter().all(|s| s.end < 1.0));
        assert!(corrected.iter().all(|s| s.end >= 1.0));

        for spin in &corrected {
            let global = spin.global.translation();
            assert!((global.x - (UTM_EAST + 10.0)).abs() < 1e-3);
            assert!((global.y - UTM_NORTH).abs() < 1e-3);
        }

        // The rotation ending at 0.975 completes after the first corrected
        // sample arrives and is still released on dead reckoning.
        assert!(dr.last().is_some_and(|s| (s.end - 0.975).abs() < 1e-9));
        let stats = sync.stats();
        assert_eq!(stats.spins_discarded, 0);
        assert_eq!(
            stats.spins_emitted + stats.spins_discarded,
            stats.spins_assembled
        );

        // Sequence numbers stay contiguous across the switch
        for (i, spin) in spins.iter().enumerate() {
            assert_eq!(spin.sequence, i as u64);
        }
    }

    #[test]
    fn test_e2e_corrected_only_discards_early_spins() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
            write_log(dir.path(), "localization.jsonl", &corrected_log(10)),
        ];
        let bp = blueprint(
            dir.path(),
            &logs,
            "[localization]\ncorrected_only = true\n",
        );
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);

        assert_eq!(spins.len(), 4);
        assert!(spins
            .iter()
            .all(|s| s.localization_mode == LocalizationMode::Corrected));
        assert_eq!(sync.stats().spins_discarded, 9);
    }

    #[test]
    fn test_e2e_skip_measured_from_first_record() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
        ];
        let bp = blueprint(dir.path(), &logs, "");
        let mut bp = bp;
        bp.playback.skip_sec = 0.55;
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);

        // Batch 0.575 opens the stream; its rotation is a leading fragment.
        assert_eq!(spins.len(), 8);
        assert!((spins[0].start - 0.6).abs() < EPS);
        assert_eq!(spins[0].sequence, 0);
        assert_eq!(sync.stats().spins_discarded, 0);
    }

    #[test]
    fn test_e2e_unrelated_records_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
            write_log(dir.path(), "front.jsonl", &lidar_log("front_lidar")),
            write_log(dir.path(), "status.jsonl", &status_log()),
        ];
        let bp = blueprint(dir.path(), &logs, "");
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);

        assert_eq!(spins.len(), 13);
        assert!(spins.iter().all(|s| s.sensor_frame == "velodyne"));
        let stats = sync.stats();
        assert_eq!(stats.foreign_batches, 15);
        assert_eq!(stats.other_records, 10);
    }

    #[test]
    fn test_e2e_missing_log_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            dir.path().join("missing.jsonl"),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
        ];
        let bp = blueprint(dir.path(), &logs, "");
        let mut sync = synchronizer(&bp);

        assert_eq!(drain(&mut sync).len(), 13);
    }

    #[test]
    fn test_e2e_without_localization_exhausts_pending_queue() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![write_log(
            dir.path(),
            "velodyne.jsonl",
            &lidar_log("velodyne"),
        )];
        let bp = blueprint(dir.path(), &logs, "[sync]\nmax_pending_spins = 2\n");
        let mut sync = synchronizer(&bp);

        let err = sync.next_spin().unwrap_err();
        assert!(matches!(err, PlaybackError::ResourceExhausted { .. }));
        assert!(!sync.next_spin().unwrap());

        let stats = sync.stats();
        assert_eq!(stats.spins_emitted, 0);
        assert_eq!(stats.spins_assembled, 3);
        assert_eq!(stats.spins_discarded, stats.spins_assembled);
    }

    #[test]
    fn test_e2e_history_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
        ];
        let bp = blueprint(dir.path(), &logs, "[sync]\nhistory_len = 4\n");
        let mut sync = synchronizer(&bp);

        let spins = drain(&mut sync);
        assert_eq!(spins.len(), 13);

        // Drained: stepping back lands on the newest spin first
        assert!(sync.prev_spin());
        assert_eq!(sync.get_spin().unwrap().sequence, 12);
        assert!(sync.prev_spin());
        assert!(sync.prev_spin());
        assert!(sync.prev_spin());
        assert_eq!(sync.get_spin().unwrap().sequence, 9);
        assert!(!sync.prev_spin());

        assert!(sync.next_spin().unwrap());
        assert_eq!(sync.get_spin().unwrap().sequence, 10);
        assert!(sync.next_spin().unwrap());
        assert!(sync.next_spin().unwrap());
        assert_eq!(sync.get_spin().unwrap().sequence, 12);
        assert!(!sync.next_spin().unwrap());
    }

    #[test]
    fn test_e2e_missing_calibration_fails_before_playback() {
        let dir = tempfile::tempdir().unwrap();
        let result = config_loader::CalibrationResolver::resolve(
            None,
            &contracts::MapParameterStore::new(),
        );
        assert!(matches!(result, Err(PlaybackError::Configuration { .. })));

        let missing = dir.path().join("absent.toml");
        let result = config_loader::CalibrationResolver::resolve(
            Some(&missing),
            &contracts::MapParameterStore::new(),
        );
        assert!(result.is_err());
    }

    #[derive(Clone, Default)]
    struct Collector {
        updates: Arc<Mutex<Vec<TransformUpdate>>>,
    }

    impl TransformObserver for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        fn on_update(&mut self, update: &TransformUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    /// Every tree mutation reaches an asynchronous consumer in order
    #[tokio::test]
    async fn test_e2e_channel_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let logs = vec![
            write_log(dir.path(), "pose.jsonl", &pose_log()),
            write_log(dir.path(), "velodyne.jsonl", &lidar_log("velodyne")),
        ];
        let bp = blueprint(dir.path(), &logs, "");

        let collector = Collector::default();
        let (observer, worker) = ChannelBroadcaster::spawn("tf_e2e", 256, collector.clone());
        let metrics = Arc::clone(observer.metrics());

        let mut sync = synchronizer(&bp);
        sync.add_observer(Box::new(observer));
        assert_eq!(drain(&mut sync).len(), 13);
        drop(sync);

        let forwarded = worker.join().await;

        // Mount replay, then vehicle + two chain edges per pose
        assert_eq!(forwarded, 1 + 3 * 21);
        assert_eq!(metrics.dropped_count(), 0);
        assert_eq!(metrics.sent_count(), forwarded);

        let updates = collector.updates.lock().unwrap();
        assert!(updates[0].is_static());
        assert_eq!(updates[0].child, "velodyne");
        let stamps: Vec<f64> = updates.iter().filter_map(|u| u.stamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}
