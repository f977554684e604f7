//! PlaybackBlueprint - Config Loader 输出
//!
//! 描述完整的回放会话：输入日志、激光雷达、机器人模型、同步参数、变换广播。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{
    AssemblerConfig, FrameId, LocalizationConfig, QueueConfig, RigidTransform, SpinSyncConfig,
    StaticTransform,
};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的回放配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 输入日志
    pub playback: PlaybackConfig,

    /// 激光雷达配置
    #[serde(default)]
    pub lidar: LidarConfig,

    /// 机器人描述来源
    #[serde(default)]
    pub robot: RobotConfig,

    /// 同步器参数
    #[serde(default)]
    pub sync: SyncConfig,

    /// 全局链参数
    #[serde(default)]
    pub localization: LocalizationConfig,

    /// 变换广播
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// 输入日志
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// 日志文件，按时间合并 (时间相同按列表顺序)
    #[serde(default)]
    pub logs: Vec<PathBuf>,

    /// 开头跳过的时长 (秒)
    #[serde(default)]
    pub skip_sec: f64,
}

/// 激光雷达配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LidarConfig {
    /// 传感器坐标系名称
    #[serde(default = "default_sensor_frame")]
    pub sensor_frame: String,

    /// 标定文件；未设置时从参数存储读取
    #[serde(default)]
    pub calibration: Option<PathBuf>,

    /// 传感器在车体上的安装位姿；未设置时由机器人模型提供传感器坐标系
    #[serde(default)]
    pub mount: Option<MountTransform>,

    /// 参考方位角，越过即结束一圈 (度)
    #[serde(default)]
    pub start_azimuth_deg: f64,

    /// 点数少于该值的 spin 被丢弃
    #[serde(default = "default_min_points")]
    pub min_points: usize,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            sensor_frame: default_sensor_frame(),
            calibration: None,
            mount: None,
            start_azimuth_deg: 0.0,
            min_points: default_min_points(),
        }
    }
}

fn default_sensor_frame() -> String {
    "velodyne".to_string()
}

fn default_min_points() -> usize {
    AssemblerConfig::default().min_points
}

/// 传感器安装：相对车体坐标系的位置 + 旋转
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MountTransform {
    /// 位置 (x, y, z)，单位米
    pub location: Location,

    /// 旋转 (roll, pitch, yaw)，单位度
    #[serde(default)]
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotation {
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl MountTransform {
    pub fn to_rigid(&self) -> RigidTransform {
        RigidTransform::from_xyz_rpy(
            self.location.x,
            self.location.y,
            self.location.z,
            self.rotation.roll.to_radians(),
            self.rotation.pitch.to_radians(),
            self.rotation.yaw.to_radians(),
        )
    }
}

/// 机器人描述来源 (运动学模型)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    /// 描述文件 (TOML 或 JSON)
    #[serde(default)]
    pub description: Option<PathBuf>,

    /// 存放描述文本的参数存储键
    #[serde(default)]
    pub param: Option<String>,
}

impl RobotConfig {
    pub fn is_configured(&self) -> bool {
        self.description.is_some() || self.param.is_some()
    }
}

/// 同步器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// spin 变换到的目标坐标系
    #[serde(default = "default_target_frame")]
    pub target_frame: String,

    /// 待变换 spin 的上限
    #[serde(default = "default_max_pending")]
    pub max_pending_spins: usize,

    /// 为 `prev_spin` 保留的已发出 spin 数
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    /// 动态变换缓存时长 (秒)
    #[serde(default = "default_cache_duration")]
    pub cache_duration_sec: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            target_frame: default_target_frame(),
            max_pending_spins: queue.max_pending_spins,
            history_len: queue.history_len,
            cache_duration_sec: default_cache_duration(),
        }
    }
}

fn default_target_frame() -> String {
    crate::SMOOTH_FRAME.to_string()
}

fn default_max_pending() -> usize {
    QueueConfig::default().max_pending_spins
}

fn default_history_len() -> usize {
    QueueConfig::default().history_len
}

fn default_cache_duration() -> f64 {
    10.0
}

/// 变换广播配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// 是否发布每次变换树更新
    #[serde(default)]
    pub enabled: bool,

    /// 广播输出类型
    #[serde(default)]
    pub sink_type: BroadcastSinkType,

    /// channel 输出的队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sink_type: BroadcastSinkType::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

/// 广播输出类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastSinkType {
    /// 通过 tracing 记录每次更新
    #[default]
    Log,
    /// 由异步任务消费的有界 channel
    Channel,
}

impl PlaybackBlueprint {
    /// 从蓝图各段构造 SpinSyncConfig
    pub fn to_sync_config(&self) -> SpinSyncConfig {
        SpinSyncConfig {
            sensor_frame: FrameId::from(&self.lidar.sensor_frame),
            target_frame: FrameId::from(&self.sync.target_frame),
            assembler: AssemblerConfig {
                start_azimuth_deg: self.lidar.start_azimuth_deg,
                min_points: self.lidar.min_points,
                ..AssemblerConfig::default()
            },
            localization: self.localization.clone(),
            queue: QueueConfig {
                max_pending_spins: self.sync.max_pending_spins,
                history_len: self.sync.history_len,
            },
            cache_duration_s: self.sync.cache_duration_sec,
        }
    }

    /// 安装位姿对应的静态边 (如已配置)
    pub fn mount_transform(&self) -> Option<StaticTransform> {
        self.lidar.mount.map(|mount| {
            StaticTransform::new(
                self.lidar.sensor_frame.as_str(),
                FrameId::vehicle(),
                mount.to_rigid(),
            )
        })
    }
}
